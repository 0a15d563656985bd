//! Reachability check against the API health endpoint

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tether_http::{HttpRequest, Transport};
use tether_offline::ReachabilityProbe;
use tracing::debug;

/// Reachable means the health endpoint answered 2xx within the timeout
pub struct HealthProbe {
    transport: Arc<dyn Transport>,
    url: String,
    timeout: Duration,
}

impl HealthProbe {
    pub fn new(transport: Arc<dyn Transport>, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            transport,
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReachabilityProbe for HealthProbe {
    async fn probe(&self) -> bool {
        let request = HttpRequest::get(&self.url).with_header("Accept", "application/json");
        match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(Ok(response)) => {
                debug!("Health probe answered {}", response.status);
                response.is_success()
            }
            Ok(Err(e)) => {
                debug!("Health probe failed: {}", e);
                false
            }
            Err(_) => {
                debug!("Health probe timed out after {:?}", self.timeout);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_http::testing::ScriptedTransport;
    use tether_http::TransportError;

    #[tokio::test(start_paused = true)]
    async fn test_probe_outcomes() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_status(200, json!({"status": "ok"}))
            .push_status(503, json!("maintenance"))
            .push_error(TransportError::Network("refused".into()));
        let probe = HealthProbe::new(transport.clone(), "http://api/health", Duration::from_secs(5));

        assert!(probe.probe().await);
        assert!(!probe.probe().await);
        assert!(!probe.probe().await);
        assert_eq!(transport.requests()[0].url, "http://api/health");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_health_endpoint_counts_as_unreachable() {
        let transport = Arc::new(ScriptedTransport::new().with_delay(Duration::from_secs(10)));
        let probe = HealthProbe::new(transport, "http://api/health", Duration::from_secs(5));

        assert!(!probe.probe().await);
    }
}
