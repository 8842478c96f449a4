use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use utoipa::ToSchema;

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: SqlitePool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthChecks {
    pub store: CheckStatus,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            message: None,
        }
    }

    fn error(message: &str) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.to_string()),
        }
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/ready",
    responses(
        (status = 200, description = "The settings store answers", body = ReadyResponse),
        (status = 503, description = "The settings store is unavailable", body = ReadyResponse)
    ),
    tag = "Health"
)]
pub async fn ready(State(state): State<HealthState>) -> (StatusCode, Json<ReadyResponse>) {
    let (store, status_code) = match sqlx::query("SELECT 1").fetch_one(&state.db_pool).await {
        Ok(_) => (CheckStatus::ok(), StatusCode::OK),
        Err(e) => (
            CheckStatus::error(&format!("Store check failed: {}", e)),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
    };

    let status = if status_code == StatusCode::OK {
        "ready"
    } else {
        "degraded"
    };

    (
        status_code,
        Json(ReadyResponse {
            status: status.to_string(),
            checks: HealthChecks { store },
        }),
    )
}
