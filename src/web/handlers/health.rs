//! # Health Check Handlers
//!
//! Liveness and readiness endpoints for monitoring and load balancing.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, error};

use crate::web::errors::ApiError;
use crate::web::state::AppState;

/// Basic health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
}

/// Readiness response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    status: String,
    timestamp: String,
    checks: HashMap<String, HealthCheck>,
    info: HealthInfo,
}

/// Individual health check result
#[derive(Debug, Serialize)]
pub struct HealthCheck {
    status: String,
    message: Option<String>,
    duration_ms: u64,
}

/// Static facts about the running application
#[derive(Debug, Serialize)]
pub struct HealthInfo {
    version: String,
    environment: String,
    schema_version: Option<String>,
    database_pool_size: u32,
    views: usize,
}

/// Basic health check endpoint: GET /health
///
/// Returns OK whenever the process is serving requests.
pub async fn basic_health(_state: State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Readiness probe: GET /ready
///
/// Ready when the persistence unit can reach the database.
pub async fn readiness_probe(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, ApiError> {
    debug!("Performing readiness probe");

    let mut checks = HashMap::new();
    let db_check = check_database_health(&state).await;
    let healthy = db_check.status == "healthy";
    checks.insert("database".to_string(), db_check);

    if !healthy {
        error!("Readiness probe failed: database unavailable");
        return Err(ApiError::ServiceUnavailable);
    }

    let context = &state.context;
    Ok(Json(ReadinessResponse {
        status: "ready".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        checks,
        info: HealthInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: state.environment().to_string(),
            schema_version: context
                .persistence
                .schema_version()
                .map(ToString::to_string),
            database_pool_size: context.persistence.pool().size(),
            views: context.views.engine().view_names().count(),
        },
    }))
}

async fn check_database_health(state: &AppState) -> HealthCheck {
    let started = Instant::now();
    let result = state.persistence().health_check().await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(()) => HealthCheck {
            status: "healthy".to_string(),
            message: None,
            duration_ms,
        },
        Err(e) => HealthCheck {
            status: "unhealthy".to_string(),
            message: Some(e.to_string()),
            duration_ms,
        },
    }
}
