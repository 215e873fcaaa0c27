use serde::Serialize;

use crate::services::request_object::CanonicalAuthorizationParams;

/// Success body of `/auth`: the canonical parameter set handed downstream.
#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub params: CanonicalAuthorizationParams,
}
