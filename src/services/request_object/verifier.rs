//! Request object (JWS compact serialization) verification.
//!
//! This module only knows about tokens, algorithms and keys. Where the token
//! came from and how its claims are used afterwards is the resolver's job.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, KeyAlgorithm};
use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::services::clients::ClientKeys;
use crate::services::request_object::error::{self, ValidationError};
use crate::services::request_object::types::{
    ClientSigningPolicy, DeclaredAlgorithm, RawRequestToken, ResolvedClaims, SigningAlgorithm,
    TokenSource,
};

#[derive(Debug, Deserialize)]
struct JoseHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

/// The three segments of a compact token, header and payload already decoded.
#[derive(Debug)]
struct ParsedToken<'a> {
    header: JoseHeader,
    claims: Map<String, Value>,
    signature: &'a str,
}

/// Verifies request objects against a client's signing policy and keys.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    leeway_seconds: u64,
}

impl Default for TokenVerifier {
    fn default() -> Self {
        Self::new(60)
    }
}

impl TokenVerifier {
    pub fn new(leeway_seconds: u64) -> Self {
        Self { leeway_seconds }
    }

    /// Parse, enforce the client's algorithm policy, verify the signature and
    /// return the decoded claims.
    pub fn verify(
        &self,
        token: &RawRequestToken,
        client_id: &str,
        policy: &ClientSigningPolicy,
        keys: &ClientKeys,
    ) -> Result<ResolvedClaims, ValidationError> {
        // 1) structure
        let parsed = parse_compact(token.as_str()).ok_or_else(|| parse_error(token.source()))?;

        // 2) declared alg vs. registered policy
        let declared = DeclaredAlgorithm::from_header(&parsed.header.alg);
        if !policy.permits(&declared) {
            warn!(
                client_id = %client_id,
                alg = %parsed.header.alg,
                ?policy,
                "request object alg does not match registered alg"
            );
            return Err(ValidationError::invalid_request_object(
                error::PREREGISTERED_ALG,
            ));
        }

        // 3) signature
        match declared {
            DeclaredAlgorithm::None => {
                if !parsed.signature.is_empty() {
                    warn!(client_id = %client_id, "unsigned request object carries a signature");
                    return Err(bad_signature());
                }
                self.check_lifetime(&parsed.claims, chrono::Utc::now().timestamp())
                    .inspect_err(|e| {
                        warn!(client_id = %client_id, error = %e, "request object rejected");
                    })?;
                Ok(ResolvedClaims::new(parsed.claims))
            }
            DeclaredAlgorithm::Signed(alg) => {
                let key = decoding_key(alg, parsed.header.kid.as_deref(), keys).ok_or_else(|| {
                    warn!(client_id = %client_id, ?alg, "no usable key for request object");
                    bad_signature()
                })?;
                self.verify_signed(token.as_str(), alg, &key)
                    .map(ResolvedClaims::new)
                    .inspect_err(|e| {
                        warn!(client_id = %client_id, error = %e, "request object rejected");
                    })
            }
            DeclaredAlgorithm::Unsupported(alg) => {
                warn!(client_id = %client_id, alg = %alg, "unsupported request object alg");
                Err(bad_signature())
            }
        }
    }

    fn verify_signed(
        &self,
        token: &str,
        alg: SigningAlgorithm,
        key: &DecodingKey,
    ) -> Result<Map<String, Value>, ValidationError> {
        let mut validation = Validation::new(alg.to_jwt());
        // Request objects need no registered claims; exp/nbf are still checked
        // when present.
        validation.required_spec_claims.clear();
        validation.validate_aud = false;
        validation.validate_nbf = true;
        validation.leeway = self.leeway_seconds;

        let data = jsonwebtoken::decode::<Map<String, Value>>(token, key, &validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => ValidationError::invalid_request_object(error::EXPIRED),
                ErrorKind::ImmatureSignature => {
                    ValidationError::invalid_request_object(error::NOT_YET_VALID)
                }
                _ => bad_signature(),
            },
        )?;

        Ok(data.claims)
    }

    // exp/nbf for tokens that never go through `jsonwebtoken::decode`. Same
    // leeway and comparisons as the signed path.
    fn check_lifetime(&self, claims: &Map<String, Value>, now: i64) -> Result<(), ValidationError> {
        let leeway = i64::try_from(self.leeway_seconds).unwrap_or(i64::MAX);

        if let Some(exp) = numeric_claim(claims, "exp")?
            && exp < now.saturating_sub(leeway)
        {
            return Err(ValidationError::invalid_request_object(error::EXPIRED));
        }
        if let Some(nbf) = numeric_claim(claims, "nbf")?
            && nbf > now.saturating_add(leeway)
        {
            return Err(ValidationError::invalid_request_object(error::NOT_YET_VALID));
        }
        Ok(())
    }
}

// A present but non-numeric time claim is malformed, as it is for signed tokens.
fn numeric_claim(claims: &Map<String, Value>, name: &str) -> Result<Option<i64>, ValidationError> {
    match claims.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_i64()
            .or_else(|| value.as_f64().map(|v| v as i64))
            .map(Some)
            .ok_or_else(|| {
                ValidationError::invalid_request_object(format!("{} claim must be a number", name))
            }),
    }
}

fn parse_compact(token: &str) -> Option<ParsedToken<'_>> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };

    let header: JoseHeader = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header).ok()?).ok()?;
    let claims = match serde_json::from_slice::<Value>(&URL_SAFE_NO_PAD.decode(payload).ok()?) {
        Ok(Value::Object(map)) => map,
        _ => return None,
    };

    Some(ParsedToken {
        header,
        claims,
        signature,
    })
}

// Pick the verification key for `alg` from the client's registered material.
fn decoding_key(alg: SigningAlgorithm, kid: Option<&str>, keys: &ClientKeys) -> Option<DecodingKey> {
    if alg.is_symmetric() {
        let secret = keys.secret.as_deref()?;
        return Some(DecodingKey::from_secret(secret.as_bytes()));
    }

    let jwks = keys.jwks.as_ref()?;
    let jwk = match kid {
        Some(kid) => jwks.find(kid).filter(|jwk| jwk_fits(jwk, alg)),
        None => jwks.keys.iter().find(|jwk| jwk_fits(jwk, alg)),
    }?;

    DecodingKey::from_jwk(jwk)
        .inspect_err(|e| warn!(error = %e, "invalid client jwk"))
        .ok()
}

fn jwk_fits(jwk: &Jwk, alg: SigningAlgorithm) -> bool {
    // A key pinned to an algorithm may only be used with that algorithm.
    if let Some(key_alg) = &jwk.common.key_algorithm
        && *key_alg != key_algorithm(alg)
    {
        return false;
    }

    match (&jwk.algorithm, alg) {
        (
            AlgorithmParameters::RSA(_),
            SigningAlgorithm::RS256
            | SigningAlgorithm::RS384
            | SigningAlgorithm::RS512
            | SigningAlgorithm::PS256
            | SigningAlgorithm::PS384
            | SigningAlgorithm::PS512,
        ) => true,
        (AlgorithmParameters::EllipticCurve(params), SigningAlgorithm::ES256) => {
            params.curve == EllipticCurve::P256
        }
        (AlgorithmParameters::EllipticCurve(params), SigningAlgorithm::ES384) => {
            params.curve == EllipticCurve::P384
        }
        (AlgorithmParameters::OctetKeyPair(params), SigningAlgorithm::EdDSA) => {
            params.curve == EllipticCurve::Ed25519
        }
        _ => false,
    }
}

fn key_algorithm(alg: SigningAlgorithm) -> KeyAlgorithm {
    match alg {
        SigningAlgorithm::HS256 => KeyAlgorithm::HS256,
        SigningAlgorithm::HS384 => KeyAlgorithm::HS384,
        SigningAlgorithm::HS512 => KeyAlgorithm::HS512,
        SigningAlgorithm::RS256 => KeyAlgorithm::RS256,
        SigningAlgorithm::RS384 => KeyAlgorithm::RS384,
        SigningAlgorithm::RS512 => KeyAlgorithm::RS512,
        SigningAlgorithm::PS256 => KeyAlgorithm::PS256,
        SigningAlgorithm::PS384 => KeyAlgorithm::PS384,
        SigningAlgorithm::PS512 => KeyAlgorithm::PS512,
        SigningAlgorithm::ES256 => KeyAlgorithm::ES256,
        SigningAlgorithm::ES384 => KeyAlgorithm::ES384,
        SigningAlgorithm::EdDSA => KeyAlgorithm::EdDSA,
    }
}

fn parse_error(source: TokenSource) -> ValidationError {
    ValidationError::invalid_request_object(format!(
        "could not parse {} as valid JWT",
        source.param_name()
    ))
}

fn bad_signature() -> ValidationError {
    ValidationError::invalid_request_object(error::BAD_SIGNATURE)
}
