//! Rendering views into HTTP responses.

use crate::views::{ErrorView, ViewResolver};
use crate::web::errors::{ApiError, ApiResult};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::warn;

/// Name of the view rendered for failed page requests
pub const ERROR_VIEW: &str = "error";

/// A rendered view with its `Content-Type`
#[derive(Debug, Clone)]
pub struct ViewResponse {
    status: StatusCode,
    content_type: String,
    body: String,
}

impl ViewResponse {
    /// Resolve `name` and render it with `model`
    pub fn render<M: Serialize>(views: &ViewResolver, name: &str, model: &M) -> ApiResult<Self> {
        let view = views.resolve(name)?;
        let body = view.render(model)?;
        Ok(Self {
            status: StatusCode::OK,
            content_type: view.content_type().to_string(),
            body,
        })
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

impl IntoResponse for ViewResponse {
    fn into_response(self) -> Response {
        let content_type = HeaderValue::from_str(&self.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("text/html;charset=UTF-8"));
        (self.status, [(header::CONTENT_TYPE, content_type)], self.body).into_response()
    }
}

/// A failed page request, answered with the `error` view.
///
/// Falls back to the JSON body of [`ApiError`] when the error view itself
/// cannot be rendered.
#[derive(Debug)]
pub struct PageError {
    error: ApiError,
    views: ViewResolver,
}

impl PageError {
    pub fn new(error: impl Into<ApiError>, views: &ViewResolver) -> Self {
        Self {
            error: error.into(),
            views: views.clone(),
        }
    }

    pub fn error(&self) -> &ApiError {
        &self.error
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        let model = ErrorView {
            status: status.as_u16(),
            title: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.error.to_string(),
        };

        match ViewResponse::render(&self.views, ERROR_VIEW, &model) {
            Ok(page) => page.with_status(status).into_response(),
            Err(e) => {
                warn!(error = %e, "Error view unavailable, answering with JSON");
                self.error.into_response()
            }
        }
    }
}
