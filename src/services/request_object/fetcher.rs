//! Bounded `request_uri` retrieval.
//!
//! Responsibility:
//! - Reject oversized or non-https `request_uri` values before touching the network
//! - Single GET with independent connect and response deadlines
//! - Accept only a bare `200`; redirects are never followed
//!
//! No token parsing happens here: every failure is `invalid_request_uri`.
//!
//! The connect phase (TCP + TLS) is bounded by the client's connect timeout.
//! The response deadline only starts once the connector reports the
//! connection as established, so a slow server and a dead socket are told
//! apart no matter how the two timeouts compare.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until, timeout_at};
use tower::{Layer, Service};
use tracing::{debug, warn};
use url::Url;

use crate::services::request_object::error::{self, ValidationError};
use crate::services::request_object::types::{RawRequestToken, TokenSource};

pub const MAX_REQUEST_URI_LENGTH: usize = 512;

/// Knobs for the HTTP fetcher.
#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    // Deadline for establishing the connection (TCP + TLS).
    pub connect_timeout: Duration,
    // Deadline for the response (headers and body) once connected.
    pub response_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(1500),
            response_timeout: Duration::from_millis(1500),
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Retrieves the raw request object behind a `request_uri`.
#[async_trait]
pub trait RequestUriFetcher: Send + Sync + 'static {
    async fn fetch(&self, uri: &str) -> Result<RawRequestToken, ValidationError>;
}

/// Length and scheme preconditions. Runs before any network call.
pub fn check_request_uri(uri: &str) -> Result<Url, ValidationError> {
    if uri.chars().count() > MAX_REQUEST_URI_LENGTH {
        return Err(ValidationError::invalid_request_uri(error::URI_TOO_LONG));
    }

    let url = Url::parse(uri).map_err(|_| ValidationError::invalid_request_uri(error::URI_NOT_HTTPS))?;
    if url.scheme() != "https" {
        return Err(ValidationError::invalid_request_uri(error::URI_NOT_HTTPS));
    }

    Ok(url)
}

/// `reqwest`-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpRequestUriFetcher {
    client: reqwest::Client,
    policy: FetchPolicy,
}

impl HttpRequestUriFetcher {
    pub fn new(policy: FetchPolicy) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(policy.connect_timeout)
            // a 3xx must surface as a status error, not be chased
            .redirect(reqwest::redirect::Policy::none())
            // one fresh connection per fetch, dialed on the fetching task
            .pool_max_idle_per_host(0)
            .connector_layer(ConnectSignalLayer)
            .build()?;

        Ok(Self { client, policy })
    }

    // Network part of `fetch`; preconditions are already checked.
    async fn get(&self, url: Url) -> Result<String, ValidationError> {
        let target = url.to_string();
        debug!(request_uri = %target, "fetching request_uri");

        let connected = Arc::new(Notify::new());
        let send = CONNECTED.scope(connected.clone(), self.client.get(url).send());
        tokio::pin!(send);

        // Until the connector fires, only reqwest's connect timeout applies. The
        // backstop covers a connection that never reports in.
        let mut deadline =
            Instant::now() + self.policy.connect_timeout + self.policy.response_timeout;
        let mut is_connected = false;

        let sent = loop {
            tokio::select! {
                biased;
                result = &mut send => break result,
                _ = connected.notified(), if !is_connected => {
                    is_connected = true;
                    deadline = Instant::now() + self.policy.response_timeout;
                }
                _ = sleep_until(deadline) => {
                    warn!(request_uri = %target, is_connected, "request_uri response timed out");
                    return Err(connection_timeout(&target));
                }
            }
        };

        let mut response = match sent {
            Ok(response) => response,
            Err(e) if e.is_connect() && e.is_timeout() => {
                warn!(request_uri = %target, "request_uri connect timed out");
                return Err(socket_timeout(&target));
            }
            Err(e) => {
                warn!(request_uri = %target, error = %e, "request_uri fetch failed");
                return Err(ValidationError::invalid_request_uri(format!(
                    "could not fetch request_uri {}",
                    target
                )));
            }
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            warn!(request_uri = %target, status = status.as_u16(), "request_uri non-200 response");
            return Err(ValidationError::invalid_request_uri(format!(
                "expected 200, got {}",
                status.as_u16()
            )));
        }

        if let Some(len) = response.content_length()
            && len > self.policy.max_body_bytes as u64
        {
            return Err(self.too_large());
        }

        // Read the body under the same response deadline, chunk by chunk so an
        // oversized body is cut off early.
        let mut body: Vec<u8> = Vec::new();
        loop {
            let chunk = match timeout_at(deadline, response.chunk()).await {
                Ok(Ok(chunk)) => chunk,
                Ok(Err(e)) => {
                    warn!(request_uri = %target, error = %e, "request_uri body read failed");
                    return Err(ValidationError::invalid_request_uri(format!(
                        "could not fetch request_uri {}",
                        target
                    )));
                }
                Err(_elapsed) => {
                    warn!(request_uri = %target, "request_uri body timed out");
                    return Err(connection_timeout(&target));
                }
            };

            let Some(chunk) = chunk else { break };
            if body.len() + chunk.len() > self.policy.max_body_bytes {
                return Err(self.too_large());
            }
            body.extend_from_slice(&chunk);
        }

        let body = String::from_utf8(body).map_err(|_| {
            ValidationError::invalid_request_uri(format!(
                "could not fetch request_uri {}",
                target
            ))
        })?;

        Ok(body.trim().to_string())
    }

    fn too_large(&self) -> ValidationError {
        ValidationError::invalid_request_uri(format!(
            "request_uri response exceeds {} bytes",
            self.policy.max_body_bytes
        ))
    }
}

#[async_trait]
impl RequestUriFetcher for HttpRequestUriFetcher {
    async fn fetch(&self, uri: &str) -> Result<RawRequestToken, ValidationError> {
        let url = check_request_uri(uri)?;
        let body = self.get(url).await?;
        Ok(RawRequestToken::new(body, TokenSource::RequestUri))
    }
}

tokio::task_local! {
    // Set for the duration of one `send()`; the connector fires it once the
    // connection (TCP + TLS) for that request is up.
    static CONNECTED: Arc<Notify>;
}

/// Connector layer that reports an established connection to the fetch
/// running on the current task.
#[derive(Debug, Clone, Copy)]
struct ConnectSignalLayer;

impl<S> Layer<S> for ConnectSignalLayer {
    type Service = ConnectSignal<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ConnectSignal { inner }
    }
}

#[derive(Debug, Clone)]
struct ConnectSignal<S> {
    inner: S,
}

impl<S, R> Service<R> for ConnectSignal<S>
where
    S: Service<R>,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: R) -> Self::Future {
        let connecting = self.inner.call(req);
        Box::pin(async move {
            let conn = connecting.await?;
            // Outside a fetch scope there is nobody to tell.
            let _ = CONNECTED.try_with(|connected| connected.notify_one());
            Ok(conn)
        })
    }
}

fn socket_timeout(target: &str) -> ValidationError {
    ValidationError::invalid_request_uri(format!("Socket timed out on request to {}", target))
}

fn connection_timeout(target: &str) -> ValidationError {
    ValidationError::invalid_request_uri(format!("Connection timed out on request to {}", target))
}
