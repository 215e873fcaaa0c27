/*
 * Responsibility
 * - v1 の URL 構造を定義
 * - /health, /auth (GET: query, POST: form)
 */
use axum::{Router, routing::get};

use crate::state::AppState;

use crate::api::v1::handlers::{
    authorize::{authorize_get, authorize_post},
    health::health,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/auth", get(authorize_get).post(authorize_post))
}
