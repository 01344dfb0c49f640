//! HTTP delivery client
//!
//! POSTs each batch as `{"logs": [...]}` to a fixed endpoint using hyper's
//! pooled client. Network errors and non-2xx statuses are failures; the
//! `{"logged_entries": n}` success body is informational only.

use crate::delivery::token::TokenSource;
use crate::delivery::{DeliveryReceipt, Transport};
use crate::recording::event_queue::Batch;
use crate::utils::config::TelemetryConfig;
use crate::utils::errors::{Result, TelemetryError};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE, COOKIE};
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use tracing::{debug, warn};

/// Options for the HTTP delivery client
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Absolute http URI batches are POSTed to
    pub endpoint: String,

    /// Header name carrying the anti-forgery token
    pub csrf_header: String,

    /// Cookie header value for same-origin credentials
    pub cookie: Option<String>,
}

impl DeliveryConfig {
    pub fn from_telemetry_config(config: &TelemetryConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            csrf_header: config.csrf_header.clone(),
            cookie: config.cookie.clone(),
        }
    }
}

/// Delivers batches over HTTP
pub struct HttpDeliveryClient {
    endpoint: Uri,
    csrf_header: HeaderName,
    cookie: Option<HeaderValue>,
    tokens: Arc<dyn TokenSource>,
    http_client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpDeliveryClient {
    /// Create a client, validating the endpoint and header settings
    pub fn new(config: DeliveryConfig, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        let endpoint: Uri = config
            .endpoint
            .parse()
            .map_err(|e| TelemetryError::InvalidEndpoint(format!("{}: {}", config.endpoint, e)))?;

        match endpoint.scheme_str() {
            Some("http") => {}
            Some(other) => {
                return Err(TelemetryError::InvalidEndpoint(format!(
                    "unsupported scheme '{}' in {}",
                    other, config.endpoint
                )))
            }
            None => {
                return Err(TelemetryError::InvalidEndpoint(format!(
                    "endpoint must be absolute: {}",
                    config.endpoint
                )))
            }
        }
        if endpoint.host().is_none() {
            return Err(TelemetryError::InvalidEndpoint(format!(
                "endpoint has no host: {}",
                config.endpoint
            )));
        }

        let csrf_header = HeaderName::from_bytes(config.csrf_header.as_bytes())
            .map_err(|e| TelemetryError::InvalidHeader(format!("{}: {}", config.csrf_header, e)))?;

        let cookie = config
            .cookie
            .as_deref()
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|e| TelemetryError::InvalidHeader(format!("cookie: {}", e)))?;

        let http_client = Client::builder(TokioExecutor::new()).build_http();

        Ok(Self {
            endpoint,
            csrf_header,
            cookie,
            tokens,
            http_client,
        })
    }

    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    fn build_request(&self, body: Vec<u8>) -> Result<Request<Full<Bytes>>> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json");

        if let Some(token) = self.tokens.token() {
            match HeaderValue::from_str(&token) {
                Ok(value) => builder = builder.header(self.csrf_header.clone(), value),
                Err(_) => warn!("Anti-forgery token is not a valid header value, sending without it"),
            }
        }

        if let Some(cookie) = &self.cookie {
            builder = builder.header(COOKIE, cookie.clone());
        }

        builder
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| TelemetryError::Transport(format!("Request build error: {}", e)))
    }
}

#[async_trait]
impl Transport for HttpDeliveryClient {
    async fn deliver(&self, batch: &Batch) -> Result<DeliveryReceipt> {
        let body = serde_json::to_vec(&batch.payload())?;
        let request = self.build_request(body)?;

        debug!("Delivering batch of {} entries to {}", batch.len(), self.endpoint);

        let response = self
            .http_client
            .request(request)
            .await
            .map_err(|e| TelemetryError::Transport(format!("Delivery request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| TelemetryError::Transport(format!("Response body error: {}", e)))?
            .to_bytes();

        if !status.is_success() {
            return Err(TelemetryError::Rejected {
                status: status.as_u16(),
            });
        }

        let receipt = serde_json::from_slice::<DeliveryReceipt>(&body).unwrap_or_else(|_| {
            debug!("Delivery response body is not a receipt, ignoring");
            DeliveryReceipt::default()
        });

        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::token::{NoToken, StaticToken};

    fn config(endpoint: &str) -> DeliveryConfig {
        DeliveryConfig {
            endpoint: endpoint.to_string(),
            csrf_header: "X-CSRFToken".to_string(),
            cookie: None,
        }
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client =
            HttpDeliveryClient::new(config("http://127.0.0.1:8000/activity/log/"), Arc::new(NoToken))
                .unwrap();
        assert_eq!(client.endpoint().path(), "/activity/log/");
    }

    #[tokio::test]
    async fn test_rejects_unusable_endpoints() {
        for endpoint in ["/activity/log/", "https://example.com/log", "not a uri"] {
            let result = HttpDeliveryClient::new(config(endpoint), Arc::new(NoToken));
            assert!(
                matches!(result, Err(TelemetryError::InvalidEndpoint(_))),
                "accepted {}",
                endpoint
            );
        }
    }

    #[tokio::test]
    async fn test_rejects_invalid_header_name() {
        let mut cfg = config("http://127.0.0.1:8000/log");
        cfg.csrf_header = "bad header".to_string();
        let result = HttpDeliveryClient::new(cfg, Arc::new(NoToken));
        assert!(matches!(result, Err(TelemetryError::InvalidHeader(_))));
    }

    #[tokio::test]
    async fn test_request_headers() {
        let mut cfg = config("http://127.0.0.1:8000/log");
        cfg.cookie = Some("sessionid=abc".to_string());
        let client = HttpDeliveryClient::new(cfg, Arc::new(StaticToken::new("tok"))).unwrap();

        let request = client.build_request(b"{}".to_vec()).unwrap();
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(request.headers()["x-csrftoken"], "tok");
        assert_eq!(request.headers()[COOKIE], "sessionid=abc");
    }

    #[tokio::test]
    async fn test_request_without_token() {
        let client =
            HttpDeliveryClient::new(config("http://127.0.0.1:8000/log"), Arc::new(NoToken)).unwrap();
        let request = client.build_request(Vec::new()).unwrap();
        assert!(request.headers().get("x-csrftoken").is_none());
        assert!(request.headers().get(COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_failure() {
        // Port 9 (discard) is not expected to accept connections locally
        let client =
            HttpDeliveryClient::new(config("http://127.0.0.1:9/log"), Arc::new(NoToken)).unwrap();
        let result = client.deliver(&Batch::default()).await;
        assert!(matches!(result, Err(TelemetryError::Transport(_))));
    }
}
