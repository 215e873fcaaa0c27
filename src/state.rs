/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - ex: resolver: RequestObjectResolver, reporter: ErrorReporter
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 */
use std::sync::Arc;

use crate::services::request_object::{ErrorReporter, RequestObjectResolver};

#[derive(Clone, Debug)]
pub struct AppState {
    pub resolver: Arc<RequestObjectResolver>,
    pub reporter: Arc<ErrorReporter>,
}

impl AppState {
    pub fn new(resolver: Arc<RequestObjectResolver>, reporter: Arc<ErrorReporter>) -> Self {
        Self { resolver, reporter }
    }
}
