use thiserror::Error;

pub type MonitorResult<T> = Result<T, MonitorError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("metrics source unavailable after {failures} consecutive failures")]
    SourceUnavailable { failures: u32 },
}
