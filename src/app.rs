/*
 * Responsibility
 * - Config読み込み → 依存生成 (client registry / fetcher / resolver / reporter)
 * - Router 組み立て + middleware の適用
 * - axum::serve() で起動
 */
use std::{panic, process, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::Config;
use crate::middleware;
use crate::services::clients::{ClientPolicyLookup, StaticClientRegistry};
use crate::services::request_object::{
    ErrorReporter, HttpRequestUriFetcher, RequestObjectResolver, TokenVerifier, TracingObserver,
};
use crate::state::AppState;

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,authz_request=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        // Development: crash the whole process so we notice immediately.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting authorization endpoint in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let registry = StaticClientRegistry::from_file(&config.clients_file)
        .with_context(|| format!("loading {}", config.clients_file.display()))?;
    tracing::info!(clients = registry.len(), "client registry loaded");

    let state = build_state(&config, Arc::new(registry))?;
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Wire the resolver against a client lookup backend.
pub fn build_state(config: &Config, clients: Arc<dyn ClientPolicyLookup>) -> Result<AppState> {
    let fetcher = HttpRequestUriFetcher::new(config.fetch_policy())
        .context("building request_uri http client")?;

    let resolver = RequestObjectResolver::new(
        Arc::new(fetcher),
        clients,
        TokenVerifier::new(config.request_object_leeway_seconds),
    );
    let reporter = ErrorReporter::new().with_observer(Arc::new(TracingObserver));

    Ok(AppState::new(Arc::new(resolver), Arc::new(reporter)))
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    let router = Router::new().merge(api::v1::routes()).with_state(state);
    let router = middleware::security_headers::apply(router);
    middleware::http::apply(router, config)
}
