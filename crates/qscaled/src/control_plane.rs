//! HTTP control-plane adapter.
//!
//! ```text
//! GET  {base}/api/v1/clusters/{cluster}/services/{service}
//!      → {"desired_count": 3, "running_count": 3}
//! POST {base}/api/v1/clusters/{cluster}/services/{service}/scale
//!      ← {"desired_count": 5}
//! ```

use std::time::Duration;

use http::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use qscale_broker::{encode_path_segment, exchange};
use qscale_state::{
    BoxFuture, ClusterServiceMutator, ClusterTaskCountSource, CollaboratorError,
    CollaboratorResult, ServiceId, TaskCounts, is_success_status,
};

/// Service counts as reported by the control plane. Absent fields are unknown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceCounts {
    #[serde(default)]
    pub desired_count: Option<u32>,
    #[serde(default)]
    pub running_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleRequest {
    pub desired_count: u32,
}

/// Reads and sets replica counts over the control plane's REST API.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    base_url: String,
    timeout: Duration,
}

impl HttpControlPlane {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn service_url(&self, service: &ServiceId) -> String {
        format!(
            "{}/api/v1/clusters/{}/services/{}",
            self.base_url,
            encode_path_segment(&service.cluster),
            encode_path_segment(&service.service)
        )
    }
}

impl ClusterTaskCountSource for HttpControlPlane {
    fn task_counts<'a>(
        &'a self,
        service: &'a ServiceId,
    ) -> BoxFuture<'a, CollaboratorResult<TaskCounts>> {
        Box::pin(async move {
            let url = self.service_url(service);
            let resp = exchange(Method::GET, &url, None, None, self.timeout).await?;
            if !is_success_status(resp.status) {
                return Err(CollaboratorError::Status(resp.status));
            }
            let counts: ServiceCounts = serde_json::from_slice(&resp.body)
                .map_err(|e| CollaboratorError::Decode(e.to_string()))?;
            debug!(
                service = %service,
                desired = ?counts.desired_count,
                running = ?counts.running_count,
                "task counts"
            );
            Ok(TaskCounts {
                desired: counts.desired_count,
                running: counts.running_count,
            })
        })
    }
}

impl ClusterServiceMutator for HttpControlPlane {
    fn set_desired_count<'a>(
        &'a self,
        service: &'a ServiceId,
        count: u32,
    ) -> BoxFuture<'a, CollaboratorResult<u16>> {
        Box::pin(async move {
            let url = format!("{}/scale", self.service_url(service));
            let body = serde_json::to_vec(&ScaleRequest {
                desired_count: count,
            })
            .map_err(|e| CollaboratorError::Decode(e.to_string()))?;
            let resp = exchange(Method::POST, &url, None, Some(body), self.timeout).await?;
            Ok(resp.status)
        })
    }
}
