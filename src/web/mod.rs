//! # Web Layer
//!
//! The HTTP surface over an [`ApplicationContext`]: static resources under the
//! configured path (`/resources/**` by default), health probes and
//! server-rendered pages.

pub mod errors;
pub mod handlers;
pub mod response;
pub mod state;

use crate::bootstrap::ApplicationContext;
use crate::config::WebSettings;
use crate::error::{Result, WebappError};
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use errors::{ApiError, ApiResult};
pub use response::{PageError, ViewResponse};
pub use state::AppState;

/// Build the router for an application context
pub fn create_app(state: AppState) -> Result<Router> {
    let web = &state.context.web;
    validate_static_path(&web.static_path)?;

    info!(
        path = %web.static_path,
        directory = %web.static_directory.display(),
        "Serving static resources"
    );
    let static_files = ServeDir::new(&web.static_directory);
    let static_path = web.static_path.trim_end_matches('/').to_string();

    Ok(Router::new()
        .route("/", get(handlers::pages::index))
        .route("/health", get(handlers::health::basic_health))
        .route("/ready", get(handlers::health::readiness_probe))
        .nest_service(&static_path, static_files)
        .fallback(handlers::pages::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Static files are mounted below a literal path
fn validate_static_path(path: &str) -> Result<()> {
    let trimmed = path.trim_end_matches('/');
    let literal = trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'));

    if !trimmed.starts_with('/') || trimmed.len() < 2 || !literal {
        return Err(WebappError::Server(format!(
            "web.static_path '{path}' must be a literal path below '/', e.g. '/resources'"
        )));
    }
    Ok(())
}

/// Serve the application until `shutdown` resolves
pub async fn serve<F>(context: Arc<ApplicationContext>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let WebSettings { bind_address, .. } = context.web.clone();
    let app = create_app(AppState::new(context))?;

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .map_err(|e| WebappError::Server(format!("Failed to bind to {bind_address}: {e}")))?;

    info!("Web server listening on {}", bind_address);
    info!("   Health Check: http://{}/health", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| WebappError::Server(e.to_string()))
}
