//! Authorization request parameter resolution for an OpenID Connect / OAuth2
//! authorization endpoint: `request` and `request_uri` (JAR) handling,
//! request object signature checks and merging into the canonical parameter
//! set.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod services;
pub mod state;
