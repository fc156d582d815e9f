#![allow(dead_code)]
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::controller::AppState;

/// Health check response, backed by the site loop's watchdog (§4.7) rather
/// than a synthetic always-healthy stub.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    site_loop: ComponentHealth,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ComponentHealth {
    fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            error: None,
        }
    }

    fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            status: "unhealthy".to_string(),
            error: Some(error.into()),
        }
    }
}

/// `GET /health` - returns 200 while the site loop has refreshed its
/// watchdog within its grace period, 503 once it has gone stale (§4.7).
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let site_healthy = state.site.health().healthy();

    let site_loop = if site_healthy {
        ComponentHealth::healthy()
    } else {
        ComponentHealth::unhealthy("site loop has not ticked within its grace period")
    };

    let response = HealthResponse {
        status: if site_healthy {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        timestamp: chrono::Utc::now(),
        checks: HealthChecks { site_loop },
    };

    let status_code = if site_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}

/// `GET /health/ready` - readiness probe: same signal as `/health`, no body.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.site.health().healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// `GET /health/live` - liveness probe: the process is up, full stop.
pub async fn liveness_check() -> impl IntoResponse {
    StatusCode::OK
}
