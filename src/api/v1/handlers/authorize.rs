/*
 * Responsibility
 * - GET/POST /auth (authorization endpoint の入口)
 * - query / form を AuthorizationRequestParams に変換して resolver に渡す
 * - 失敗時は reporter 経由で authentication.error を 1 回だけ出して、redirect しないエラーを返す
 */
use std::collections::BTreeMap;

use axum::{
    Form, Json,
    extract::{Query, State},
    http::HeaderMap,
};

use crate::api::v1::dto::authorize::AuthorizeResponse;
use crate::error::AppError;
use crate::middleware::http::REQUEST_ID_HEADER;
use crate::services::request_object::{AuthorizationRequestParams, RequestContext};
use crate::state::AppState;

pub async fn authorize_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> Result<Json<AuthorizeResponse>, AppError> {
    authorize(&state, &headers, AuthorizationRequestParams::new(query)).await
}

pub async fn authorize_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<BTreeMap<String, String>>,
) -> Result<Json<AuthorizeResponse>, AppError> {
    authorize(&state, &headers, AuthorizationRequestParams::new(form)).await
}

async fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    params: AuthorizationRequestParams,
) -> Result<Json<AuthorizeResponse>, AppError> {
    match state.resolver.resolve(&params).await {
        Ok(canonical) => Ok(Json(AuthorizeResponse { params: canonical })),
        Err(err) => {
            let ctx = RequestContext {
                client_id: params.client_id().map(str::to_string),
                request_id: headers
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
            };
            Err(state.reporter.report(err, &ctx))
        }
    }
}
