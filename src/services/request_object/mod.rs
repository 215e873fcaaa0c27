pub mod error;
pub mod fetcher;
pub mod reporter;
pub mod resolver;
pub mod types;
pub mod verifier;

pub use error::{ErrorCode, ValidationError};
pub use fetcher::{FetchPolicy, HttpRequestUriFetcher, RequestUriFetcher};
pub use reporter::{
    AuthenticationErrorEvent, AuthenticationErrorObserver, ErrorReporter, RequestContext,
    TracingObserver,
};
pub use resolver::RequestObjectResolver;
pub use types::{
    AuthorizationRequestParams, CanonicalAuthorizationParams, ClientSigningPolicy,
    RawRequestToken, ResolvedClaims, SigningAlgorithm, TokenSource,
};
pub use verifier::TokenVerifier;
