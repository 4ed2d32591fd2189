//! Server-rendered pages. Failures render the `error` view.

use crate::views::IndexView;
use crate::web::errors::ApiError;
use crate::web::response::{PageError, ViewResponse};
use crate::web::state::AppState;
use axum::extract::State;

/// Landing page: GET /
pub async fn index(State(state): State<AppState>) -> Result<ViewResponse, PageError> {
    let model = IndexView {
        title: "Welcome".to_string(),
        message: format!("Running in the {} environment.", state.environment()),
    };
    ViewResponse::render(state.views(), "index", &model)
        .map_err(|e| PageError::new(e, state.views()))
}

/// Fallback for unmatched routes
pub async fn not_found(State(state): State<AppState>) -> PageError {
    PageError::new(ApiError::NotFound, state.views())
}
