//! Cluster scaler — applies a desired count through the control plane.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use qscale_state::{ClusterServiceMutator, ServiceId, is_success_status};

use crate::error::{ScaleError, ScaleResult};

/// Thin wrapper around a [`ClusterServiceMutator`] that bounds each call
/// and interprets the returned status.
#[derive(Clone)]
pub struct ClusterScaler {
    mutator: Arc<dyn ClusterServiceMutator>,
    timeout: Duration,
}

impl ClusterScaler {
    pub fn new(mutator: Arc<dyn ClusterServiceMutator>, timeout: Duration) -> Self {
        Self { mutator, timeout }
    }

    /// Set the desired count for `service`. `Ok` only on a 2xx (200-204) status.
    pub async fn set_desired_count(&self, service: &ServiceId, count: u32) -> ScaleResult<()> {
        let status =
            tokio::time::timeout(self.timeout, self.mutator.set_desired_count(service, count))
                .await
                .map_err(|_| ScaleError::Timeout(self.timeout))??;

        if !is_success_status(status) {
            warn!(service = %service, count, status, "desired count rejected");
            return Err(ScaleError::Rejected { count, status });
        }
        info!(service = %service, count, status, "desired count updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qscale_state::{BoxFuture, CollaboratorError, CollaboratorResult};
    use std::sync::Mutex;

    enum Reply {
        Status(u16),
        Fail,
        Hang,
    }

    struct FakeMutator {
        reply: Reply,
        calls: Mutex<Vec<(ServiceId, u32)>>,
    }

    impl FakeMutator {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl ClusterServiceMutator for FakeMutator {
        fn set_desired_count<'a>(
            &'a self,
            service: &'a ServiceId,
            count: u32,
        ) -> BoxFuture<'a, CollaboratorResult<u16>> {
            self.calls.lock().unwrap().push((service.clone(), count));
            Box::pin(async move {
                match self.reply {
                    Reply::Status(s) => Ok(s),
                    Reply::Fail => Err(CollaboratorError::Transport("connection refused".into())),
                    Reply::Hang => std::future::pending().await,
                }
            })
        }
    }

    fn svc() -> ServiceId {
        ServiceId::new("prod", "orders")
    }

    #[tokio::test]
    async fn success_status_is_ok() {
        let fake = FakeMutator::new(Reply::Status(204));
        let scaler = ClusterScaler::new(fake.clone(), Duration::from_secs(1));
        scaler.set_desired_count(&svc(), 7).await.unwrap();
        assert_eq!(fake.calls.lock().unwrap().as_slice(), &[(svc(), 7)]);
    }

    #[tokio::test]
    async fn error_status_is_rejected() {
        let scaler =
            ClusterScaler::new(FakeMutator::new(Reply::Status(409)), Duration::from_secs(1));
        let err = scaler.set_desired_count(&svc(), 7).await.unwrap_err();
        assert!(matches!(err, ScaleError::Rejected { count: 7, status: 409 }));
    }

    #[tokio::test]
    async fn transport_error_propagates() {
        let scaler = ClusterScaler::new(FakeMutator::new(Reply::Fail), Duration::from_secs(1));
        let err = scaler.set_desired_count(&svc(), 7).await.unwrap_err();
        assert!(matches!(err, ScaleError::Collaborator(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let scaler = ClusterScaler::new(FakeMutator::new(Reply::Hang), Duration::from_millis(2500));
        let err = scaler.set_desired_count(&svc(), 7).await.unwrap_err();
        assert!(matches!(err, ScaleError::Timeout(_)));
    }
}
