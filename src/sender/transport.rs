use crate::batch::LogBatch;
use crate::fallback::FallbackChannel;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, ClientBuilder};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

const PUSH_PATH: &str = "/loki/api/v1/push";

#[derive(Error, Debug)]
pub enum TransportFault {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Request timeout: {0}")]
    Timeout(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Request failed: {0}")]
    RequestFailed(String),
}

/// One outbound delivery: an opaque, already-serialized push payload.
#[derive(Debug, Clone)]
pub struct PushRequest {
    pub batch_id: String,
    pub payload: Bytes,
}

impl PushRequest {
    pub fn from_batch(batch: &LogBatch) -> Self {
        Self {
            batch_id: batch.id().to_string(),
            payload: batch.payload().clone(),
        }
    }
}

/// What the remote endpoint answered. The body is kept verbatim so callers
/// see exactly what the transport produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushResponse {
    pub status: u16,
    pub body: Bytes,
}

impl PushResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A capability to send one push request and get back a response or a fault.
///
/// The delivery interceptor wraps any implementation of this with an
/// identical signature, so composition replaces subclassing.
pub trait Transport: Send + Sync {
    fn deliver(
        &self,
        request: &PushRequest,
    ) -> impl Future<Output = Result<PushResponse, TransportFault>> + Send;
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3100".to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: concat!("loki-relay/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct DeliveryStats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
}

impl DeliveryStats {
    pub fn record(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
        }
    }
}

/// Real HTTP transport toward the Loki push endpoint.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    config: TransportConfig,
    push_url: Url,
    fallback: Arc<dyn FallbackChannel>,
    stats: Arc<DeliveryStats>,
}

impl HttpTransport {
    pub fn new(
        config: TransportConfig,
        fallback: Arc<dyn FallbackChannel>,
    ) -> Result<Self, TransportFault> {
        let push_url = Self::build_push_url(&config.endpoint)?;

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                TransportFault::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            config,
            push_url,
            fallback,
            stats: Arc::new(DeliveryStats::default()),
        })
    }

    fn build_push_url(endpoint: &str) -> Result<Url, TransportFault> {
        let base: Url = endpoint.parse().map_err(|e| {
            TransportFault::InvalidConfiguration(format!("Invalid endpoint URL: {e}"))
        })?;

        if base.path().ends_with(PUSH_PATH) {
            return Ok(base);
        }

        let mut url = base;
        let joined = format!("{}{PUSH_PATH}", url.path().trim_end_matches('/'));
        url.set_path(&joined);
        Ok(url)
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    pub fn push_url(&self) -> &Url {
        &self.push_url
    }

    pub fn stats(&self) -> Arc<DeliveryStats> {
        self.stats.clone()
    }

    fn map_send_error(error: &reqwest::Error) -> TransportFault {
        if error.is_timeout() {
            TransportFault::Timeout(error.to_string())
        } else if error.is_connect() {
            TransportFault::ConnectionFailed(error.to_string())
        } else {
            TransportFault::RequestFailed(error.to_string())
        }
    }
}

impl Transport for HttpTransport {
    async fn deliver(&self, request: &PushRequest) -> Result<PushResponse, TransportFault> {
        let start = Instant::now();

        let response = match self
            .client
            .post(self.push_url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(request.payload.clone())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.stats.record(false);
                return Err(Self::map_send_error(&e));
            }
        };

        let status = response.status().as_u16();
        let success = response.status().is_success();
        self.stats.record(success);

        // The status alone decides the outcome; a fault while reading the
        // body afterwards is a diagnostic, not a delivery failure.
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                self.fallback.report(&format!(
                    "response body read failed for batch {}: {e}",
                    request.batch_id
                ));
                Bytes::new()
            }
        };

        if success {
            debug!(
                "Pushed batch {} ({} bytes) in {:?}",
                request.batch_id,
                request.payload.len(),
                start.elapsed()
            );
        } else {
            warn!("Push of batch {} rejected: HTTP {}", request.batch_id, status);
        }

        Ok(PushResponse { status, body })
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("config", &self.config)
            .field("push_url", &self.push_url)
            .finish_non_exhaustive()
    }
}
