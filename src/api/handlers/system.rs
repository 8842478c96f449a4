use std::sync::Arc;

use axum::{extract::State, Json};

use crate::api::extractors::AppJson;
use crate::domain::models::{
    ConfigSnapshot, ConnectionTestRequest, ConnectionTestResult, ImportReport, ReloadResponse,
    SettingsMetaResponse, SettingsPayload, SystemConfigResponse,
};
use crate::domain::services::{ConnectionTestService, SystemConfigService};
use crate::error::AppResult;

pub type SystemConfigServiceState = Arc<SystemConfigService>;
pub type ConnectionTestServiceState = Arc<ConnectionTestService>;

#[utoipa::path(
    get,
    path = "/api/config/system",
    responses(
        (status = 200, description = "Every collection and the effective settings, secrets masked", body = SystemConfigResponse)
    ),
    tag = "System"
)]
pub async fn get_system_config(
    State(service): State<SystemConfigServiceState>,
) -> AppResult<Json<SystemConfigResponse>> {
    Ok(Json(service.system_config().await?))
}

#[utoipa::path(
    get,
    path = "/api/config/settings",
    responses(
        (status = 200, description = "Effective system settings, sensitive values masked", body = SettingsPayload)
    ),
    tag = "System"
)]
pub async fn get_settings(
    State(service): State<SystemConfigServiceState>,
) -> AppResult<Json<SettingsPayload>> {
    let settings = service.get_settings().await?;
    Ok(Json(SettingsPayload { settings }))
}

#[utoipa::path(
    put,
    path = "/api/config/settings",
    request_body = SettingsPayload,
    responses(
        (status = 200, description = "Settings written; the effective map is returned", body = SettingsPayload),
        (status = 400, description = "Wrong type or key pinned by the environment")
    ),
    tag = "System"
)]
pub async fn update_settings(
    State(service): State<SystemConfigServiceState>,
    AppJson(payload): AppJson<SettingsPayload>,
) -> AppResult<Json<SettingsPayload>> {
    let settings = service.update_settings(payload.settings).await?;
    Ok(Json(SettingsPayload { settings }))
}

#[utoipa::path(
    get,
    path = "/api/config/settings/meta",
    responses(
        (status = 200, description = "Per-key sensitivity, editability and source", body = SettingsMetaResponse)
    ),
    tag = "System"
)]
pub async fn get_settings_meta(
    State(service): State<SystemConfigServiceState>,
) -> AppResult<Json<SettingsMetaResponse>> {
    Ok(Json(service.settings_meta().await?))
}

#[utoipa::path(
    post,
    path = "/api/config/test",
    request_body = ConnectionTestRequest,
    responses(
        (status = 200, description = "Probe outcome; a failed probe is still 200", body = ConnectionTestResult),
        (status = 400, description = "Config does not match the declared type")
    ),
    tag = "System"
)]
pub async fn test_connection(
    State(service): State<ConnectionTestServiceState>,
    AppJson(payload): AppJson<ConnectionTestRequest>,
) -> AppResult<Json<ConnectionTestResult>> {
    Ok(Json(service.test(payload).await?))
}

#[utoipa::path(
    post,
    path = "/api/config/export",
    responses(
        (status = 200, description = "Snapshot of the store without secrets", body = ConfigSnapshot)
    ),
    tag = "System"
)]
pub async fn export_config(
    State(service): State<SystemConfigServiceState>,
) -> AppResult<Json<ConfigSnapshot>> {
    Ok(Json(service.export().await?))
}

#[utoipa::path(
    post,
    path = "/api/config/import",
    request_body = ConfigSnapshot,
    responses(
        (status = 200, description = "Store replaced by the snapshot", body = ImportReport),
        (status = 400, description = "Snapshot rejected; nothing was written")
    ),
    tag = "System"
)]
pub async fn import_config(
    State(service): State<SystemConfigServiceState>,
    AppJson(payload): AppJson<ConfigSnapshot>,
) -> AppResult<Json<ImportReport>> {
    Ok(Json(service.import(payload).await?))
}

#[utoipa::path(
    post,
    path = "/api/config/reload",
    responses(
        (status = 200, description = "Runtime configuration rebuilt from the store", body = ReloadResponse)
    ),
    tag = "System"
)]
pub async fn reload_config(
    State(service): State<SystemConfigServiceState>,
) -> AppResult<Json<ReloadResponse>> {
    Ok(Json(service.reload().await?))
}
