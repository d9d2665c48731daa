//! SEMP v2 monitor adapter: VPN state probe and queue statistics.
//!
//! ```text
//! GET {semp_url}/SEMP/v2/monitor/msgVpns/{vpn}?select=state
//!     → {"data": {"state": "up"}}
//! GET {semp_url}/SEMP/v2/monitor/msgVpns/{vpn}/queues/{queue}?select=...
//!     → {"data": {"averageRxMsgRate": n, "msgSpoolUsage": n, ...},
//!        "collections": {"msgs": {"count": n}}}
//! ```

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::Method;
use serde_json::Value;
use tracing::{debug, warn};

use qscale_state::{
    BoxFuture, BrokerEndpoint, CollaboratorError, CollaboratorResult, QueueMetrics,
    QueueMetricsSource, VpnStateProbe, is_success_status,
};

use crate::client::{TlsConfig, encode_path_segment, exchange_with_tls};

const QUEUE_SELECT: &str =
    "msgs.count,msgVpnName,queueName,msgSpoolUsage,averageRxMsgRate,averageTxMsgRate";

/// SEMP client for one queue on one message VPN.
///
/// Endpoints are passed per call so the failover monitor can switch
/// between active and standby.
#[derive(Debug, Clone)]
pub struct SempClient {
    msg_vpn_name: String,
    queue: String,
    timeout: Duration,
    tls: Option<TlsConfig>,
}

impl SempClient {
    pub fn new(
        msg_vpn_name: impl Into<String>,
        queue: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            msg_vpn_name: msg_vpn_name.into(),
            queue: queue.into(),
            timeout,
            tls: None,
        }
    }

    /// Use `tls` for `https://` endpoints instead of the webpki roots.
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn vpn_state_url(&self, endpoint: &BrokerEndpoint) -> String {
        format!(
            "{}/SEMP/v2/monitor/msgVpns/{}?select=state",
            endpoint.semp_url,
            encode_path_segment(&self.msg_vpn_name)
        )
    }

    pub fn queue_url(&self, endpoint: &BrokerEndpoint) -> String {
        format!(
            "{}/SEMP/v2/monitor/msgVpns/{}/queues/{}?select={QUEUE_SELECT}",
            endpoint.semp_url,
            encode_path_segment(&self.msg_vpn_name),
            encode_path_segment(&self.queue)
        )
    }

    async fn get_json(
        &self,
        endpoint: &BrokerEndpoint,
        url: &str,
    ) -> CollaboratorResult<Option<Value>> {
        let auth = basic_auth(endpoint);
        let resp = exchange_with_tls(
            self.tls.as_ref(),
            Method::GET,
            url,
            auth.as_deref(),
            None,
            self.timeout,
        )
        .await?;
        if !is_success_status(resp.status) {
            warn!(%url, status = resp.status, "SEMP request returned error status");
            return Ok(None);
        }
        let value = serde_json::from_slice(&resp.body)
            .map_err(|e| CollaboratorError::Decode(format!("{url}: {e}")))?;
        Ok(Some(value))
    }
}

impl VpnStateProbe for SempClient {
    fn is_up<'a>(&'a self, endpoint: &'a BrokerEndpoint) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let url = self.vpn_state_url(endpoint);
            match self.get_json(endpoint, &url).await {
                Ok(Some(body)) => {
                    let state = body.pointer("/data/state").and_then(Value::as_str);
                    debug!(semp_url = %endpoint.semp_url, ?state, "message VPN state");
                    state == Some("up")
                }
                Ok(None) => false,
                Err(e) => {
                    warn!(semp_url = %endpoint.semp_url, error = %e, "VPN state probe failed");
                    false
                }
            }
        })
    }
}

impl QueueMetricsSource for SempClient {
    fn fetch<'a>(
        &'a self,
        endpoint: &'a BrokerEndpoint,
    ) -> BoxFuture<'a, CollaboratorResult<Option<QueueMetrics>>> {
        Box::pin(async move {
            let url = self.queue_url(endpoint);
            Ok(self.get_json(endpoint, &url).await?.map(|body| parse_queue_metrics(&body)))
        })
    }
}

/// Pull the tracked statistics out of a queue monitor response.
/// Missing fields read as zero.
pub fn parse_queue_metrics(body: &Value) -> QueueMetrics {
    QueueMetrics {
        message_count: read_u64(body, "/collections/msgs/count"),
        message_receive_rate: read_u64(body, "/data/averageRxMsgRate"),
        message_spool_usage: read_u64(body, "/data/msgSpoolUsage"),
    }
}

fn read_u64(body: &Value, pointer: &str) -> u64 {
    match body.pointer(pointer) {
        Some(v) => v
            .as_u64()
            .or_else(|| v.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(0),
        None => 0,
    }
}

/// `Basic` credentials, only when both username and password are set.
fn basic_auth(endpoint: &BrokerEndpoint) -> Option<String> {
    match (&endpoint.username, &endpoint.password) {
        (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
            Some(format!("Basic {}", STANDARD.encode(format!("{user}:{pass}"))))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use std::sync::Arc;

    use qscale_state::ServiceId;

    use crate::client::testing::serve_tls;
    use crate::failover::{BrokerEndpointSet, FailoverMonitor, PollOutcome};

    const QUEUE_BODY: &str = r#"{
        "collections": {"msgs": {"count": 42}},
        "data": {"averageRxMsgRate": 7, "msgSpoolUsage": 900}
    }"#;

    #[test]
    fn urls_follow_semp_layout() {
        let client = SempClient::new("default", "orders/in", Duration::from_secs(1));
        let ep = BrokerEndpoint::new("http://broker-a:8080");
        assert_eq!(
            client.vpn_state_url(&ep),
            "http://broker-a:8080/SEMP/v2/monitor/msgVpns/default?select=state"
        );
        assert_eq!(
            client.queue_url(&ep),
            "http://broker-a:8080/SEMP/v2/monitor/msgVpns/default/queues/orders%2Fin\
             ?select=msgs.count,msgVpnName,queueName,msgSpoolUsage,averageRxMsgRate,averageTxMsgRate"
        );
    }

    #[test]
    fn parse_reads_nested_fields() {
        let body = json!({
            "collections": {"msgs": {"count": 1234}},
            "data": {
                "averageRxMsgRate": 56,
                "msgSpoolUsage": 789_000,
                "queueName": "orders"
            }
        });
        assert_eq!(
            parse_queue_metrics(&body),
            QueueMetrics {
                message_count: 1234,
                message_receive_rate: 56,
                message_spool_usage: 789_000,
            }
        );
    }

    #[test]
    fn parse_defaults_missing_fields_to_zero() {
        let body = json!({"data": {"averageRxMsgRate": 12.7}});
        let metrics = parse_queue_metrics(&body);
        assert_eq!(metrics.message_count, 0);
        assert_eq!(metrics.message_receive_rate, 12);
        assert_eq!(metrics.message_spool_usage, 0);
    }

    #[test]
    fn basic_auth_needs_both_credentials() {
        let ep = BrokerEndpoint::new("http://b").with_credentials("admin", "admin");
        assert_eq!(basic_auth(&ep).as_deref(), Some("Basic YWRtaW46YWRtaW4="));

        let mut user_only = BrokerEndpoint::new("http://b");
        user_only.username = Some("admin".into());
        assert_eq!(basic_auth(&user_only), None);
    }

    #[tokio::test]
    async fn reads_vpn_state_over_https() {
        let addr = serve_tls(|_| r#"{"data":{"state":"up"}}"#).await;
        let client = SempClient::new("default", "orders", Duration::from_secs(5))
            .with_tls(TlsConfig::dangerous_no_verify());
        let ep = BrokerEndpoint::new(format!("https://{addr}"));
        assert!(client.is_up(&ep).await);
    }

    #[tokio::test]
    async fn fetches_queue_metrics_over_https() {
        let addr = serve_tls(|_| QUEUE_BODY).await;
        let client = SempClient::new("default", "orders", Duration::from_secs(5))
            .with_tls(TlsConfig::dangerous_no_verify());
        let ep = BrokerEndpoint::new(format!("https://{addr}"));
        let metrics = client.fetch(&ep).await.unwrap();
        assert_eq!(
            metrics,
            Some(QueueMetrics {
                message_count: 42,
                message_receive_rate: 7,
                message_spool_usage: 900,
            })
        );
    }

    #[tokio::test]
    async fn failover_monitor_polls_https_broker() {
        let addr = serve_tls(|path| {
            if path.contains("/queues/") {
                QUEUE_BODY
            } else {
                r#"{"data":{"state":"up"}}"#
            }
        })
        .await;
        let client = Arc::new(
            SempClient::new("default", "orders", Duration::from_secs(5))
                .with_tls(TlsConfig::dangerous_no_verify()),
        );
        let endpoints = BrokerEndpointSet::new(BrokerEndpoint::new(format!("https://{addr}")), None);
        let mut monitor = FailoverMonitor::new(
            ServiceId::new("prod", "orders"),
            endpoints,
            client.clone(),
            client,
            Duration::from_secs(5),
        );

        match monitor.poll().await.unwrap() {
            PollOutcome::Snapshot(metrics) => assert_eq!(metrics.message_count, 42),
            other => panic!("expected a snapshot, got {other:?}"),
        }
        assert_eq!(monitor.endpoints().consecutive_failures(), 0);
    }
}
