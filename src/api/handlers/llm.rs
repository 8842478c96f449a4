use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::extractors::{AppJson, ProviderFilter};
use crate::domain::models::{
    ActiveLlmConfig, ConnectionTestResult, LlmConfigResponse, LlmTestRequest, MessageResponse,
    ProviderTemplate, SaveLlmConfigRequest,
};
use crate::domain::services::LlmConfigService;
use crate::error::AppResult;

pub type LlmConfigServiceState = Arc<LlmConfigService>;

#[utoipa::path(
    get,
    path = "/api/llm",
    responses(
        (status = 200, description = "LLM configs sorted by provider, keys masked", body = Vec<LlmConfigResponse>)
    ),
    tag = "LLM"
)]
pub async fn list_llm_configs(
    State(service): State<LlmConfigServiceState>,
) -> AppResult<Json<Vec<LlmConfigResponse>>> {
    Ok(Json(service.list().await?))
}

#[utoipa::path(
    post,
    path = "/api/llm",
    request_body = SaveLlmConfigRequest,
    responses(
        (status = 200, description = "LLM config created or updated", body = LlmConfigResponse),
        (status = 400, description = "Invalid fields"),
        (status = 404, description = "No LLM config with the given id")
    ),
    tag = "LLM"
)]
pub async fn save_llm_config(
    State(service): State<LlmConfigServiceState>,
    AppJson(payload): AppJson<SaveLlmConfigRequest>,
) -> AppResult<Json<LlmConfigResponse>> {
    Ok(Json(service.save(payload).await?))
}

#[utoipa::path(
    delete,
    path = "/api/llm/{id}",
    params(
        ("id" = String, Path, description = "LLM config ID")
    ),
    responses(
        (status = 200, description = "LLM config deleted", body = MessageResponse),
        (status = 404, description = "LLM config not found")
    ),
    tag = "LLM"
)]
pub async fn delete_llm_config(
    State(service): State<LlmConfigServiceState>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    service.delete(&id).await?;
    Ok(Json(MessageResponse::ok("LLM config deleted")))
}

#[utoipa::path(
    post,
    path = "/api/llm/test",
    request_body = LlmTestRequest,
    responses(
        (status = 200, description = "Probe outcome; a failed probe is still 200", body = ConnectionTestResult),
        (status = 404, description = "LLM config not found or disabled")
    ),
    tag = "LLM"
)]
pub async fn test_llm_config(
    State(service): State<LlmConfigServiceState>,
    AppJson(payload): AppJson<LlmTestRequest>,
) -> AppResult<Json<ConnectionTestResult>> {
    Ok(Json(service.test(&payload.config_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/llm/active",
    params(
        ("provider" = Option<String>, Query, description = "Restrict the lookup to one provider")
    ),
    responses(
        (status = 200, description = "Configuration the analysis runtime would use, key masked", body = ActiveLlmConfig),
        (status = 404, description = "No enabled LLM config")
    ),
    tag = "LLM"
)]
pub async fn active_llm_config(
    State(service): State<LlmConfigServiceState>,
    ProviderFilter(provider): ProviderFilter,
) -> AppResult<Json<ActiveLlmConfig>> {
    Ok(Json(service.active(provider.as_deref()).await?))
}

#[utoipa::path(
    get,
    path = "/api/llm/templates",
    responses(
        (status = 200, description = "Provider presets for form prefill", body = Vec<ProviderTemplate>)
    ),
    tag = "LLM"
)]
pub async fn llm_templates(
    State(service): State<LlmConfigServiceState>,
) -> Json<Vec<ProviderTemplate>> {
    Json(service.templates())
}
