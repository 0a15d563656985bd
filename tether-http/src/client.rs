//! reqwest-backed transport

use crate::config::TransportConfig;
use crate::errors::TransportError;
use crate::transport::Transport;
use crate::types::{HttpRequest, HttpResponse};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client,
};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Sends requests over the network with a shared connection pool
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Build a transport from configuration
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        debug!(
            "Creating ReqwestTransport with timeout: {}s",
            config.timeout.as_secs()
        );
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .redirect(reqwest::redirect::Policy::limited(
                config.max_redirects as usize,
            ))
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }

    fn map_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }

    fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, TransportError> {
        let mut header_map = HeaderMap::new();
        for (key, value) in headers {
            let name = HeaderName::from_str(key)
                .map_err(|_| TransportError::InvalidRequest(format!("invalid header name '{key}'")))?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                TransportError::InvalidRequest(format!("invalid value for header '{key}'"))
            })?;
            header_map.insert(name, value);
        }
        Ok(header_map)
    }
}

/// Parse a body as JSON, carrying non-JSON text as a string and empty bodies as null
pub(crate) fn parse_body(text: &str) -> JsonValue {
    if text.trim().is_empty() {
        return JsonValue::Null;
    }
    match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            warn!("Response body is not JSON, keeping it as text");
            JsonValue::String(text.to_string())
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        debug!("Building {} request to {}", request.method, request.url);
        let mut builder = self
            .client
            .request(reqwest::Method::from(request.method), &request.url)
            .headers(Self::header_map(&request.headers)?);

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| self.map_error(e))?;
        let status = response.status().as_u16();
        debug!("HTTP response received: {} from {}", status, request.url);

        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();

        let text = response.text().await.map_err(|e| self.map_error(e))?;

        Ok(HttpResponse {
            status,
            headers,
            body: parse_body(&text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_body_variants() {
        assert_eq!(parse_body(""), JsonValue::Null);
        assert_eq!(parse_body("  \n"), JsonValue::Null);
        assert_eq!(parse_body(r#"{"id": 7}"#), json!({"id": 7}));
        assert_eq!(parse_body("Bad Gateway"), json!("Bad Gateway"));
    }

    #[test]
    fn test_invalid_header_name_is_rejected() {
        let mut headers = BTreeMap::new();
        headers.insert("bad header".to_string(), "x".to_string());

        let err = ReqwestTransport::header_map(&headers).unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let transport = ReqwestTransport::new(&TransportConfig {
            timeout: Duration::from_secs(2),
            ..TransportConfig::default()
        })
        .unwrap();

        // Port 9 on loopback is discard; nothing listens there in test environments
        let err = transport
            .send(HttpRequest::get("http://127.0.0.1:9/health"))
            .await
            .unwrap_err();
        assert!(err.is_connectivity_loss());
    }
}
