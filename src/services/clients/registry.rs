//! Static client registry loaded from a JSON document.
//!
//! Document shape:
//! ```json
//! { "clients": [
//!     { "client_id": "client-with-HS-sig",
//!       "client_secret": "atleast32byteslongforHS256mmkay?",
//!       "request_object_signing_alg": "HS256" },
//!     { "client_id": "client", "jwks": { "keys": [ ... ] } }
//! ] }
//! ```
use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use serde::Deserialize;
use thiserror::Error;

use crate::services::clients::client::{ClientKeys, ClientPolicyLookup, ClientRecord, LookupError};
use crate::services::request_object::types::{ClientSigningPolicy, UnsupportedAlgorithm};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read client registry: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid client registry json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("client {client_id}: {source}")]
    Algorithm {
        client_id: String,
        source: UnsupportedAlgorithm,
    },
    #[error("duplicate client_id: {0}")]
    Duplicate(String),
}

#[derive(Debug, Deserialize)]
struct RegistryDocument {
    clients: Vec<ClientEntry>,
}

#[derive(Debug, Deserialize)]
struct ClientEntry {
    client_id: String,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    request_object_signing_alg: Option<String>,
    #[serde(default)]
    jwks: Option<JwkSet>,
}

/// In-memory [`ClientPolicyLookup`].
#[derive(Debug, Clone, Default)]
pub struct StaticClientRegistry {
    clients: HashMap<String, ClientRecord>,
}

impl StaticClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, record: ClientRecord) -> Self {
        self.clients.insert(record.client_id.clone(), record);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let doc: RegistryDocument = serde_json::from_str(json)?;

        let mut clients = HashMap::with_capacity(doc.clients.len());
        for entry in doc.clients {
            let policy =
                ClientSigningPolicy::from_registered(entry.request_object_signing_alg.as_deref())
                    .map_err(|source| RegistryError::Algorithm {
                        client_id: entry.client_id.clone(),
                        source,
                    })?;

            let record = ClientRecord {
                client_id: entry.client_id.clone(),
                policy,
                keys: ClientKeys {
                    secret: entry.client_secret,
                    jwks: entry.jwks,
                },
            };

            if clients.insert(entry.client_id.clone(), record).is_some() {
                return Err(RegistryError::Duplicate(entry.client_id));
            }
        }

        Ok(Self { clients })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[async_trait]
impl ClientPolicyLookup for StaticClientRegistry {
    fn backend_name(&self) -> &'static str {
        "static"
    }

    async fn lookup(&self, client_id: &str) -> Result<Option<ClientRecord>, LookupError> {
        Ok(self.clients.get(client_id).cloned())
    }
}
