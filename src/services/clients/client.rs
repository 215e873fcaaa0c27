//! Client policy lookup interface consumed by request object resolution.
use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use thiserror::Error;

use crate::services::request_object::types::ClientSigningPolicy;

/// Lookup backend errors.
///
/// Not:
/// - Callers treat these as verification failures (fail-closed), never as
///   "client has no policy".
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("client lookup backend error: {0}")]
    Backend(String),
}

/// Verification key material registered for a client.
#[derive(Clone, Default)]
pub struct ClientKeys {
    // HMAC secret (HS256/384/512)
    pub secret: Option<String>,
    // Public keys for asymmetric algorithms
    pub jwks: Option<JwkSet>,
}

impl std::fmt::Debug for ClientKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("ClientKeys")
            .field("has_secret", &self.secret.is_some())
            .field(
                "jwks_len",
                &self.jwks.as_ref().map(|set| set.keys.len()).unwrap_or(0),
            )
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ClientRecord {
    pub client_id: String,
    pub policy: ClientSigningPolicy,
    pub keys: ClientKeys,
}

/// Read-only view of registered clients.
///
/// Implementations must be safe to share across concurrent requests.
#[async_trait]
pub trait ClientPolicyLookup: Send + Sync + 'static {
    // Returns the backend name (for logging).
    fn backend_name(&self) -> &'static str;

    // Returns:
    // - `Ok(Some(_))` registered client
    // - `Ok(None)`    unknown client_id
    // - `Err(_)`      backend failure
    async fn lookup(&self, client_id: &str) -> Result<Option<ClientRecord>, LookupError>;
}
