//! `authentication.error` reporting.
//!
//! Observers are registered explicitly on the reporter (no process-wide bus).
//! One failed resolution produces exactly one event per observer, and the
//! caller gets back the error it should render.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::error::AppError;
use crate::services::request_object::error::{ErrorCode, ValidationError};

pub const AUTHENTICATION_ERROR: &str = "authentication.error";

/// What we know about the in-flight request when it failed.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub client_id: Option<String>,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthenticationErrorEvent {
    pub message: ErrorCode,
    pub error_description: String,
    pub client_id: Option<String>,
    pub request_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

pub trait AuthenticationErrorObserver: Send + Sync {
    fn on_error(&self, event: &AuthenticationErrorEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl AuthenticationErrorObserver for TracingObserver {
    fn on_error(&self, event: &AuthenticationErrorEvent) {
        warn!(
            event = AUTHENTICATION_ERROR,
            error = %event.message,
            error_description = %event.error_description,
            client_id = event.client_id.as_deref().unwrap_or("-"),
            request_id = event.request_id.as_deref().unwrap_or("-"),
            "authorization request rejected"
        );
    }
}

#[derive(Clone, Default)]
pub struct ErrorReporter {
    observers: Vec<Arc<dyn AuthenticationErrorObserver>>,
}

impl std::fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(mut self, observer: Arc<dyn AuthenticationErrorObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Emit one event and hand back the error response for the flow to render.
    pub fn report(&self, error: ValidationError, ctx: &RequestContext) -> AppError {
        let event = AuthenticationErrorEvent {
            message: error.code,
            error_description: error.description.clone(),
            client_id: ctx.client_id.clone(),
            request_id: ctx.request_id.clone(),
            occurred_at: Utc::now(),
        };

        for observer in &self.observers {
            observer.on_error(&event);
        }

        AppError::Validation(error)
    }
}
