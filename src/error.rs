/*
 * Responsibility
 * - アプリ共通の AppError 定義
 * - IntoResponse 実装 (HTTP status / JSON error body)
 * - 認可リクエストの検証エラーは redirect せずにその場でエラーを返す
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::request_object::ValidationError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// OAuth-style error body (`error` / `error_description`).
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub error_description: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Validation(e) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: e.code.as_str(),
                    error_description: e.description,
                },
            ),
        };

        (status, Json(body)).into_response()
    }
}
