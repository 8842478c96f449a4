use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::api::extractors::{AppJson, JsonOrDefault};
use crate::domain::models::{
    ConnectionTestResult, DatabaseConfigCreated, DatabaseConfigDraft, DatabaseConfigPatch,
    DatabaseConfigResponse, MessageResponse, ProbeOptions,
};
use crate::domain::services::DatabaseConfigService;
use crate::error::AppResult;

pub type DatabaseConfigServiceState = Arc<DatabaseConfigService>;

#[utoipa::path(
    get,
    path = "/api/config/database",
    responses(
        (status = 200, description = "Database configs, passwords masked", body = Vec<DatabaseConfigResponse>)
    ),
    tag = "Databases"
)]
pub async fn list_database_configs(
    State(service): State<DatabaseConfigServiceState>,
) -> AppResult<Json<Vec<DatabaseConfigResponse>>> {
    Ok(Json(service.list().await?))
}

#[utoipa::path(
    post,
    path = "/api/config/database",
    request_body = DatabaseConfigDraft,
    responses(
        (status = 201, description = "Database config added", body = DatabaseConfigCreated),
        (status = 400, description = "Invalid fields"),
        (status = 409, description = "A database config with this name exists")
    ),
    tag = "Databases"
)]
pub async fn add_database_config(
    State(service): State<DatabaseConfigServiceState>,
    AppJson(payload): AppJson<DatabaseConfigDraft>,
) -> AppResult<(StatusCode, Json<DatabaseConfigCreated>)> {
    let created = service.add(payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/config/database/{name}",
    params(
        ("name" = String, Path, description = "Database config name")
    ),
    responses(
        (status = 200, description = "Database config", body = DatabaseConfigResponse),
        (status = 404, description = "Database config not found")
    ),
    tag = "Databases"
)]
pub async fn get_database_config(
    State(service): State<DatabaseConfigServiceState>,
    Path(name): Path<String>,
) -> AppResult<Json<DatabaseConfigResponse>> {
    Ok(Json(service.get(&name).await?))
}

#[utoipa::path(
    put,
    path = "/api/config/database/{name}",
    params(
        ("name" = String, Path, description = "Database config name")
    ),
    request_body = DatabaseConfigPatch,
    responses(
        (status = 200, description = "Database config updated", body = DatabaseConfigResponse),
        (status = 400, description = "Invalid fields"),
        (status = 404, description = "Database config not found")
    ),
    tag = "Databases"
)]
pub async fn update_database_config(
    State(service): State<DatabaseConfigServiceState>,
    Path(name): Path<String>,
    AppJson(payload): AppJson<DatabaseConfigPatch>,
) -> AppResult<Json<DatabaseConfigResponse>> {
    Ok(Json(service.update(&name, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/api/config/database/{name}",
    params(
        ("name" = String, Path, description = "Database config name")
    ),
    responses(
        (status = 200, description = "Database config deleted", body = MessageResponse),
        (status = 404, description = "Database config not found")
    ),
    tag = "Databases"
)]
pub async fn delete_database_config(
    State(service): State<DatabaseConfigServiceState>,
    Path(name): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    service.delete(&name).await?;
    Ok(Json(MessageResponse::ok(format!(
        "Database config '{}' deleted",
        name
    ))))
}

#[utoipa::path(
    post,
    path = "/api/config/database/{name}/test",
    params(
        ("name" = String, Path, description = "Database config name")
    ),
    request_body(content = ProbeOptions, description = "Optional timeout override; the body may be empty"),
    responses(
        (status = 200, description = "Probe outcome; a failed probe is still 200", body = ConnectionTestResult),
        (status = 404, description = "Database config not found")
    ),
    tag = "Databases"
)]
pub async fn test_database_config(
    State(service): State<DatabaseConfigServiceState>,
    Path(name): Path<String>,
    JsonOrDefault(options): JsonOrDefault<ProbeOptions>,
) -> AppResult<Json<ConnectionTestResult>> {
    Ok(Json(service.test(&name, options.timeout_secs).await?))
}
