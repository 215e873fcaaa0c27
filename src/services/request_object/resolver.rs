use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::services::clients::{ClientKeys, ClientPolicyLookup};
use crate::services::request_object::error::{self, ValidationError};
use crate::services::request_object::fetcher::RequestUriFetcher;
use crate::services::request_object::types::{
    AuthorizationRequestParams, CanonicalAuthorizationParams, ClientSigningPolicy,
    PARAM_CLIENT_ID, PARAM_REQUEST, PARAM_REQUEST_URI, PARAM_RESPONSE_TYPE, RawRequestToken,
    ResolvedClaims, TokenSource,
};
use crate::services::request_object::verifier::TokenVerifier;

/// Turns `request` / `request_uri` into a verified, canonical parameter set.
///
/// Holds no per-request state; one instance is shared by all requests.
#[derive(Clone)]
pub struct RequestObjectResolver {
    fetcher: Arc<dyn RequestUriFetcher>,
    clients: Arc<dyn ClientPolicyLookup>,
    verifier: TokenVerifier,
}

impl std::fmt::Debug for RequestObjectResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestObjectResolver")
            .field("clients", &self.clients.backend_name())
            .field("verifier", &self.verifier)
            .finish()
    }
}

impl RequestObjectResolver {
    pub fn new(
        fetcher: Arc<dyn RequestUriFetcher>,
        clients: Arc<dyn ClientPolicyLookup>,
        verifier: TokenVerifier,
    ) -> Self {
        Self {
            fetcher,
            clients,
            verifier,
        }
    }

    /// Resolve the request object (if any) carried by `params`.
    ///
    /// The first failing check wins; nothing of a failed request object is
    /// ever merged.
    pub async fn resolve(
        &self,
        params: &AuthorizationRequestParams,
    ) -> Result<CanonicalAuthorizationParams, ValidationError> {
        let has_request = params.contains(PARAM_REQUEST);
        let has_request_uri = params.contains(PARAM_REQUEST_URI);

        // 1) nothing to resolve
        if !has_request && !has_request_uri {
            return Ok(CanonicalAuthorizationParams::from_params(params));
        }

        // 2) both at once is the same nesting problem as a self-referencing object
        if has_request && has_request_uri {
            warn!("both request and request_uri supplied");
            return Err(inception());
        }

        // 3) raw token, inline or fetched
        let token = match params.get(PARAM_REQUEST_URI) {
            Some(uri) => self.fetcher.fetch(uri).await?,
            None => RawRequestToken::new(
                params.get(PARAM_REQUEST).unwrap_or_default(),
                TokenSource::Request,
            ),
        };

        let client_id = params.client_id().unwrap_or_default();
        debug!(
            client_id = %client_id,
            source = ?token.source(),
            token_sha256 = %token.fingerprint(),
            "resolving request object"
        );

        // 4) client policy + signature
        let (policy, keys) = self.client_policy(client_id).await?;
        let claims = self.verifier.verify(&token, client_id, &policy, &keys)?;

        // 5) no request objects inside request objects
        if claims.contains(PARAM_REQUEST) || claims.contains(PARAM_REQUEST_URI) {
            warn!(client_id = %client_id, "request object contains request/request_uri");
            return Err(inception());
        }

        // 6) guarded parameters must agree
        check_consistent(params, &claims)?;

        // 7) merge
        info!(client_id = %client_id, source = ?token.source(), "request object resolved");
        Ok(CanonicalAuthorizationParams::merge(params, &claims))
    }

    async fn client_policy(
        &self,
        client_id: &str,
    ) -> Result<(ClientSigningPolicy, ClientKeys), ValidationError> {
        match self.clients.lookup(client_id).await {
            Ok(Some(record)) => Ok((record.policy, record.keys)),
            Ok(None) => {
                warn!(client_id = %client_id, "request object for unknown client");
                Err(ValidationError::invalid_request_object(error::BAD_SIGNATURE))
            }
            Err(err) => {
                // fail closed
                warn!(
                    client_id = %client_id,
                    backend = self.clients.backend_name(),
                    error = %err,
                    "client lookup failed"
                );
                Err(ValidationError::invalid_request_object(error::BAD_SIGNATURE))
            }
        }
    }
}

fn check_consistent(
    params: &AuthorizationRequestParams,
    claims: &ResolvedClaims,
) -> Result<(), ValidationError> {
    if let Some(response_type) = claims.get_param(PARAM_RESPONSE_TYPE)
        && params.response_type() != Some(response_type.as_str())
    {
        return Err(ValidationError::invalid_request_object(
            error::RESPONSE_TYPE_MISMATCH,
        ));
    }

    if let Some(client_id) = claims.get_param(PARAM_CLIENT_ID)
        && params.client_id() != Some(client_id.as_str())
    {
        return Err(ValidationError::invalid_request_object(
            error::CLIENT_ID_MISMATCH,
        ));
    }

    Ok(())
}

fn inception() -> ValidationError {
    ValidationError::invalid_request_object(error::INCEPTION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clients::{ClientRecord, LookupError, StaticClientRegistry};
    use crate::services::request_object::error::ErrorCode;
    use crate::services::request_object::fetcher::{FetchPolicy, HttpRequestUriFetcher};
    use crate::services::request_object::types::SigningAlgorithm;
    use async_trait::async_trait;
    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use jsonwebtoken::{Algorithm, EncodingKey, Header};
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HS_SECRET: &str = "atleast32byteslongforHS256mmkay?";
    const REQUEST_URI: &str = "https://client.example.com/request";

    /// Serves canned bodies by URI and counts calls.
    #[derive(Default)]
    struct StubFetcher {
        bodies: Mutex<HashMap<String, Result<String, ValidationError>>>,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        fn serving(uri: &str, body: Result<String, ValidationError>) -> Arc<Self> {
            let stub = Self::default();
            stub.bodies.lock().unwrap().insert(uri.to_string(), body);
            Arc::new(stub)
        }
    }

    #[async_trait]
    impl RequestUriFetcher for StubFetcher {
        async fn fetch(&self, uri: &str) -> Result<RawRequestToken, ValidationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.bodies.lock().unwrap().get(uri) {
                Some(Ok(body)) => Ok(RawRequestToken::new(body.clone(), TokenSource::RequestUri)),
                Some(Err(e)) => Err(e.clone()),
                None => Err(ValidationError::invalid_request_uri("expected 200, got 404")),
            }
        }
    }

    struct FailingLookup;

    #[async_trait]
    impl ClientPolicyLookup for FailingLookup {
        fn backend_name(&self) -> &'static str {
            "failing"
        }

        async fn lookup(&self, _client_id: &str) -> Result<Option<ClientRecord>, LookupError> {
            Err(LookupError::Backend("connection reset".into()))
        }
    }

    fn registry() -> Arc<StaticClientRegistry> {
        Arc::new(
            StaticClientRegistry::new()
                .with_client(ClientRecord {
                    client_id: "client".into(),
                    policy: ClientSigningPolicy::Unset,
                    keys: ClientKeys::default(),
                })
                .with_client(ClientRecord {
                    client_id: "client-with-HS-sig".into(),
                    policy: ClientSigningPolicy::Algorithm(SigningAlgorithm::HS256),
                    keys: ClientKeys {
                        secret: Some(HS_SECRET.into()),
                        jwks: None,
                    },
                }),
        )
    }

    fn resolver(fetcher: Arc<dyn RequestUriFetcher>) -> RequestObjectResolver {
        RequestObjectResolver::new(fetcher, registry(), TokenVerifier::default())
    }

    fn unsigned(payload: Value) -> String {
        format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#),
            URL_SAFE_NO_PAD.encode(payload.to_string())
        )
    }

    fn hs256(payload: Value) -> String {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &payload,
            &EncodingKey::from_secret(HS_SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn uri_params(client_id: &str) -> AuthorizationRequestParams {
        [
            ("request_uri", REQUEST_URI),
            ("scope", "openid"),
            ("client_id", client_id),
            ("response_type", "code"),
        ]
        .into_iter()
        .collect()
    }

    async fn resolve_uri(
        client_id: &str,
        body: String,
    ) -> Result<CanonicalAuthorizationParams, ValidationError> {
        resolver(StubFetcher::serving(REQUEST_URI, Ok(body)))
            .resolve(&uri_params(client_id))
            .await
    }

    #[tokio::test]
    async fn passthrough_without_request_object() {
        let stub = Arc::new(StubFetcher::default());
        let params: AuthorizationRequestParams =
            [("client_id", "client"), ("response_type", "code")]
                .into_iter()
                .collect();

        let out = resolver(stub.clone()).resolve(&params).await.unwrap();
        assert_eq!(out.as_map(), params.as_map());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsigned_object_for_unset_policy_merges() {
        let out = resolve_uri(
            "client",
            unsigned(json!({
                "client_id": "client",
                "response_type": "code",
                "redirect_uri": "https://client.example.com/cb",
                "scope": "openid email"
            })),
        )
        .await
        .unwrap();

        assert_eq!(out.get("redirect_uri"), Some("https://client.example.com/cb"));
        assert_eq!(out.get("scope"), Some("openid email"));
        assert_eq!(out.get("request_uri"), Some(REQUEST_URI));
    }

    #[tokio::test]
    async fn signed_object_for_declared_policy_merges() {
        let out = resolve_uri(
            "client-with-HS-sig",
            hs256(json!({
                "client_id": "client-with-HS-sig",
                "response_type": "code",
                "redirect_uri": "https://client.example.com/cb"
            })),
        )
        .await
        .unwrap();
        assert_eq!(out.get("redirect_uri"), Some("https://client.example.com/cb"));
    }

    #[tokio::test]
    async fn inline_request_is_resolved_without_fetch() {
        let stub = Arc::new(StubFetcher::default());
        let token = hs256(json!({
            "client_id": "client-with-HS-sig",
            "response_type": "code",
            "state": "xyz"
        }));
        let params: AuthorizationRequestParams = [
            ("request", token.as_str()),
            ("client_id", "client-with-HS-sig"),
            ("response_type", "code"),
        ]
        .into_iter()
        .collect();

        let out = resolver(stub.clone()).resolve(&params).await.unwrap();
        assert_eq!(out.get("state"), Some("xyz"));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fetch_errors_propagate_unchanged() {
        let timeout = ValidationError::invalid_request_uri(format!(
            "Connection timed out on request to {}",
            REQUEST_URI
        ));
        let err = resolver(StubFetcher::serving(REQUEST_URI, Err(timeout.clone())))
            .resolve(&uri_params("client"))
            .await
            .unwrap_err();
        assert_eq!(err, timeout);
    }

    #[tokio::test]
    async fn uri_preconditions_apply_through_http_fetcher() {
        let http = Arc::new(HttpRequestUriFetcher::new(FetchPolicy::default()).unwrap());

        let mut long = uri_params("client").as_map().clone();
        long.insert(
            "request_uri".into(),
            format!("https://veeeeryloong.com/uri#{}", "Lorem&Ipsum".repeat(60)),
        );
        let err = resolver(http.clone())
            .resolve(&AuthorizationRequestParams::new(long))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequestUri);
        assert_eq!(err.description, error::URI_TOO_LONG);

        let mut insecure = uri_params("client").as_map().clone();
        insecure.insert("request_uri".into(), "http://insecure.com".into());
        let err = resolver(http)
            .resolve(&AuthorizationRequestParams::new(insecure))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequestUri);
        assert_eq!(err.description, error::URI_NOT_HTTPS);
    }

    #[tokio::test]
    async fn rejects_request_inception() {
        for nested in ["request", "request_uri"] {
            let mut payload = json!({
                "client_id": "client",
                "response_type": "code",
                "redirect_uri": "https://client.example.com/cb"
            });
            payload[nested] = json!("inception");

            let err = resolve_uri("client", unsigned(payload)).await.unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidRequestObject);
            assert_eq!(err.description, error::INCEPTION);
        }
    }

    #[tokio::test]
    async fn rejects_both_parameters_before_fetching() {
        let stub = StubFetcher::serving(REQUEST_URI, Ok(unsigned(json!({}))));
        let mut both = uri_params("client").as_map().clone();
        both.insert("request".into(), unsigned(json!({})));

        let err = resolver(stub.clone())
            .resolve(&AuthorizationRequestParams::new(both))
            .await
            .unwrap_err();
        assert_eq!(err.description, error::INCEPTION);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejects_response_type_mismatch() {
        let err = resolve_uri(
            "client",
            unsigned(json!({ "client_id": "client", "response_type": "id_token" })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.description, error::RESPONSE_TYPE_MISMATCH);
    }

    #[tokio::test]
    async fn rejects_client_id_mismatch() {
        let err = resolve_uri(
            "client",
            unsigned(json!({ "client_id": "client2", "response_type": "code" })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.description, error::CLIENT_ID_MISMATCH);
    }

    #[tokio::test]
    async fn rejects_malformed_body() {
        let err = resolve_uri("client", "definitely.notsigned.jwt".into())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequestObject);
        assert!(
            err.description
                .contains("could not parse request_uri as valid JWT")
        );
    }

    #[tokio::test]
    async fn declared_alg_cannot_be_bypassed_with_none() {
        let err = resolve_uri(
            "client-with-HS-sig",
            unsigned(json!({
                "client_id": "client-with-HS-sig",
                "response_type": "code"
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.description, error::PREREGISTERED_ALG);
    }

    #[tokio::test]
    async fn signature_without_client_keys_is_rejected() {
        // "client" has no secret; an HS256 object cannot be verified for it
        let err = resolve_uri(
            "client",
            hs256(json!({ "client_id": "client", "response_type": "code" })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.description, error::BAD_SIGNATURE);
    }

    #[tokio::test]
    async fn unknown_client_and_lookup_failure_fail_closed() {
        let body = unsigned(json!({ "response_type": "code" }));

        let err = resolve_uri("stranger", body.clone()).await.unwrap_err();
        assert_eq!(err.description, error::BAD_SIGNATURE);

        let failing = RequestObjectResolver::new(
            StubFetcher::serving(REQUEST_URI, Ok(body)),
            Arc::new(FailingLookup),
            TokenVerifier::default(),
        );
        let err = failing.resolve(&uri_params("client")).await.unwrap_err();
        assert_eq!(err.description, error::BAD_SIGNATURE);
    }

    #[tokio::test]
    async fn repeated_resolution_is_equivalent() {
        let stub = StubFetcher::serving(
            REQUEST_URI,
            Ok(unsigned(json!({
                "client_id": "client",
                "response_type": "code",
                "nonce": "n-0S6_WzA2Mj"
            }))),
        );
        let resolver = resolver(stub.clone());

        let first = resolver.resolve(&uri_params("client")).await.unwrap();
        let second = resolver.resolve(&uri_params("client")).await.unwrap();
        assert_eq!(first, second);
        // no caching between requests
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }
}
