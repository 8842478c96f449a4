use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::api::extractors::{AppJson, JsonOrDefault};
use crate::domain::models::{
    MessageResponse, MigrateLegacyRequest, MigrationReport, SimplifiedLlmConfigRequest,
    SimplifiedLlmResponse,
};
use crate::domain::services::SimplifiedLlmService;
use crate::error::AppResult;

pub type SimplifiedLlmServiceState = Arc<SimplifiedLlmService>;

#[utoipa::path(
    get,
    path = "/api/config/llm",
    responses(
        (status = 200, description = "Model configs with their per-provider default flag", body = Vec<SimplifiedLlmResponse>)
    ),
    tag = "Models"
)]
pub async fn list_models(
    State(service): State<SimplifiedLlmServiceState>,
) -> AppResult<Json<Vec<SimplifiedLlmResponse>>> {
    Ok(Json(service.list().await?))
}

#[utoipa::path(
    post,
    path = "/api/config/llm",
    request_body = SimplifiedLlmConfigRequest,
    responses(
        (status = 201, description = "Model config added", body = SimplifiedLlmResponse),
        (status = 400, description = "Invalid fields")
    ),
    tag = "Models"
)]
pub async fn add_model(
    State(service): State<SimplifiedLlmServiceState>,
    AppJson(payload): AppJson<SimplifiedLlmConfigRequest>,
) -> AppResult<(StatusCode, Json<SimplifiedLlmResponse>)> {
    let created = service.create(payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    put,
    path = "/api/config/llm/{id}",
    params(
        ("id" = String, Path, description = "Model config ID")
    ),
    request_body = SimplifiedLlmConfigRequest,
    responses(
        (status = 200, description = "Model config replaced", body = SimplifiedLlmResponse),
        (status = 400, description = "Invalid fields"),
        (status = 404, description = "Model config not found")
    ),
    tag = "Models"
)]
pub async fn update_model(
    State(service): State<SimplifiedLlmServiceState>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<SimplifiedLlmConfigRequest>,
) -> AppResult<Json<SimplifiedLlmResponse>> {
    Ok(Json(service.update(&id, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/api/config/llm/{id}",
    params(
        ("id" = String, Path, description = "Model config ID")
    ),
    responses(
        (status = 200, description = "Model config deleted", body = MessageResponse),
        (status = 404, description = "Model config not found")
    ),
    tag = "Models"
)]
pub async fn delete_model(
    State(service): State<SimplifiedLlmServiceState>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    service.delete(&id).await?;
    Ok(Json(MessageResponse::ok("Model config deleted")))
}

#[utoipa::path(
    post,
    path = "/api/config/llm/{id}/set-default",
    params(
        ("id" = String, Path, description = "Model config ID")
    ),
    responses(
        (status = 200, description = "Default of the provider group changed", body = MessageResponse),
        (status = 404, description = "Model config not found or disabled")
    ),
    tag = "Models"
)]
pub async fn set_default_model(
    State(service): State<SimplifiedLlmServiceState>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    service.set_default(&id).await?;
    Ok(Json(MessageResponse::ok("Default model changed")))
}

#[utoipa::path(
    post,
    path = "/api/config/migrate-legacy",
    request_body(content = MigrateLegacyRequest, description = "The body may be empty"),
    responses(
        (status = 200, description = "Legacy LLM configs converted", body = MigrationReport),
        (status = 409, description = "Model configs exist and force was not set")
    ),
    tag = "Models"
)]
pub async fn migrate_legacy(
    State(service): State<SimplifiedLlmServiceState>,
    JsonOrDefault(payload): JsonOrDefault<MigrateLegacyRequest>,
) -> AppResult<Json<MigrationReport>> {
    Ok(Json(service.migrate_legacy(payload.force).await?))
}
