//! Validation failures surfaced by request object resolution.
//!
//! The taxonomy is closed: transport/policy problems with `request_uri` are
//! `invalid_request_uri`, everything about the token itself is
//! `invalid_request_object`. Descriptions are part of the contract (clients and
//! tests match on them), so the fixed ones live here as constants.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub const URI_TOO_LONG: &str = "the request_uri MUST NOT exceed 512 characters";
pub const URI_NOT_HTTPS: &str = "request_uri must use https scheme";
pub const INCEPTION: &str = "request object must not contain request or request_uri properties";
pub const PREREGISTERED_ALG: &str = "the preregistered alg must be used in request or request_uri";
pub const BAD_SIGNATURE: &str = "could not validate request object signature";
pub const RESPONSE_TYPE_MISMATCH: &str =
    "request response_type must equal the one in request parameters";
pub const CLIENT_ID_MISMATCH: &str = "request client_id must equal the one in request parameters";
pub const EXPIRED: &str = "request object has expired";
pub const NOT_YET_VALID: &str = "request object is not yet valid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequestUri,
    InvalidRequestObject,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequestUri => "invalid_request_uri",
            Self::InvalidRequestObject => "invalid_request_object",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal failure for the current authorization request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {description}")]
pub struct ValidationError {
    pub code: ErrorCode,
    pub description: String,
}

impl ValidationError {
    pub fn invalid_request_uri(description: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidRequestUri,
            description: description.into(),
        }
    }

    pub fn invalid_request_object(description: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidRequestObject,
            description: description.into(),
        }
    }
}
