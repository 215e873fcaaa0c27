use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PARAM_REQUEST: &str = "request";
pub const PARAM_REQUEST_URI: &str = "request_uri";
pub const PARAM_CLIENT_ID: &str = "client_id";
pub const PARAM_RESPONSE_TYPE: &str = "response_type";

/// Top-level authorization parameters as received (query string or form body).
///
/// The resolver never mutates this in place; it builds a new
/// [`CanonicalAuthorizationParams`] from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorizationRequestParams(BTreeMap<String, String>);

impl AuthorizationRequestParams {
    pub fn new(params: BTreeMap<String, String>) -> Self {
        Self(params)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn client_id(&self) -> Option<&str> {
        self.get(PARAM_CLIENT_ID)
    }

    pub fn response_type(&self) -> Option<&str> {
        self.get(PARAM_RESPONSE_TYPE)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

impl<K, V> FromIterator<(K, V)> for AuthorizationRequestParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Where the raw token came from. Only affects error wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Request,
    RequestUri,
}

impl TokenSource {
    pub fn param_name(&self) -> &'static str {
        match self {
            Self::Request => PARAM_REQUEST,
            Self::RequestUri => PARAM_REQUEST_URI,
        }
    }
}

/// Compact-serialized token exactly as obtained from `request` or `request_uri`.
#[derive(Clone)]
pub struct RawRequestToken {
    value: String,
    source: TokenSource,
}

impl RawRequestToken {
    pub fn new(value: impl Into<String>, source: TokenSource) -> Self {
        Self {
            value: value.into(),
            source,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn source(&self) -> TokenSource {
        self.source
    }

    /// base64url(SHA-256(token)); safe to log in place of the token itself.
    pub fn fingerprint(&self) -> String {
        use base64::Engine as _;
        use sha2::{Digest, Sha256};

        let digest = Sha256::digest(self.value.as_bytes());
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
    }
}

impl std::fmt::Debug for RawRequestToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print the token
        f.debug_struct("RawRequestToken")
            .field("source", &self.source)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Signing rule registered for a client's request objects.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClientSigningPolicy {
    /// Client registered `none`: only unsigned request objects.
    None,
    /// Client registered a concrete algorithm (e.g. `HS256`).
    Algorithm(SigningAlgorithm),
    /// Nothing registered: whatever the token declares, if keys allow it.
    #[default]
    Unset,
}

impl ClientSigningPolicy {
    /// Parse a registered `request_object_signing_alg` value.
    pub fn from_registered(alg: Option<&str>) -> Result<Self, UnsupportedAlgorithm> {
        match alg {
            None => Ok(Self::Unset),
            Some("none") => Ok(Self::None),
            Some(other) => SigningAlgorithm::parse(other).map(Self::Algorithm),
        }
    }

    /// Whether a token declaring `declared` may be used by this client.
    pub fn permits(&self, declared: &DeclaredAlgorithm) -> bool {
        match (self, declared) {
            (Self::Unset, _) => true,
            (Self::None, DeclaredAlgorithm::None) => true,
            (Self::Algorithm(expected), DeclaredAlgorithm::Signed(actual)) => expected == actual,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported signing algorithm: {0}")]
pub struct UnsupportedAlgorithm(pub String);

/// Closed set of algorithms a request object may be signed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlgorithm {
    HS256,
    HS384,
    HS512,
    RS256,
    RS384,
    RS512,
    PS256,
    PS384,
    PS512,
    ES256,
    ES384,
    EdDSA,
}

impl SigningAlgorithm {
    pub fn parse(alg: &str) -> Result<Self, UnsupportedAlgorithm> {
        let parsed = match alg {
            "HS256" => Self::HS256,
            "HS384" => Self::HS384,
            "HS512" => Self::HS512,
            "RS256" => Self::RS256,
            "RS384" => Self::RS384,
            "RS512" => Self::RS512,
            "PS256" => Self::PS256,
            "PS384" => Self::PS384,
            "PS512" => Self::PS512,
            "ES256" => Self::ES256,
            "ES384" => Self::ES384,
            "EdDSA" => Self::EdDSA,
            other => return Err(UnsupportedAlgorithm(other.to_string())),
        };
        Ok(parsed)
    }

    pub fn is_symmetric(&self) -> bool {
        matches!(self, Self::HS256 | Self::HS384 | Self::HS512)
    }

    pub fn to_jwt(self) -> jsonwebtoken::Algorithm {
        use jsonwebtoken::Algorithm;

        match self {
            Self::HS256 => Algorithm::HS256,
            Self::HS384 => Algorithm::HS384,
            Self::HS512 => Algorithm::HS512,
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::RS512 => Algorithm::RS512,
            Self::PS256 => Algorithm::PS256,
            Self::PS384 => Algorithm::PS384,
            Self::PS512 => Algorithm::PS512,
            Self::ES256 => Algorithm::ES256,
            Self::ES384 => Algorithm::ES384,
            Self::EdDSA => Algorithm::EdDSA,
        }
    }
}

/// The `alg` a token header declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredAlgorithm {
    None,
    Signed(SigningAlgorithm),
    /// Anything we do not implement; never verifiable.
    Unsupported(String),
}

impl DeclaredAlgorithm {
    pub fn from_header(alg: &str) -> Self {
        if alg == "none" {
            return Self::None;
        }
        match SigningAlgorithm::parse(alg) {
            Ok(alg) => Self::Signed(alg),
            Err(UnsupportedAlgorithm(alg)) => Self::Unsupported(alg),
        }
    }
}

/// Claims decoded from a verified request object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedClaims(Map<String, Value>);

impl ResolvedClaims {
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// String form used when merging into the parameter set.
    pub fn get_param(&self, name: &str) -> Option<String> {
        self.0.get(name).map(claim_to_param)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

// Strings merge as-is; anything else (claims object, max_age, ...) as compact JSON.
fn claim_to_param(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Final parameter set handed to the downstream authorization flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CanonicalAuthorizationParams(BTreeMap<String, String>);

impl CanonicalAuthorizationParams {
    /// No request object present: the top-level parameters are already canonical.
    pub fn from_params(params: &AuthorizationRequestParams) -> Self {
        Self(params.as_map().clone())
    }

    /// Resolved claims take precedence over overlapping top-level parameters.
    pub fn merge(params: &AuthorizationRequestParams, claims: &ResolvedClaims) -> Self {
        let mut merged = params.as_map().clone();
        for (name, value) in claims.iter() {
            merged.insert(name.clone(), claim_to_param(value));
        }
        Self(merged)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}
