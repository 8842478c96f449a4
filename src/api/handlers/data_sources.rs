use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::api::extractors::{AppJson, MarketFilter};
use crate::domain::models::{
    DataSourceCreated, DataSourceDraft, DataSourcePatch, DataSourceResponse, MessageResponse,
    ResolveDataSourcesQuery, SetDefaultDataSourceRequest,
};
use crate::domain::services::DataSourceService;
use crate::error::AppResult;

pub type DataSourceServiceState = Arc<DataSourceService>;

#[utoipa::path(
    get,
    path = "/api/config/datasource",
    responses(
        (status = 200, description = "Data sources in priority order, secrets masked", body = Vec<DataSourceResponse>)
    ),
    tag = "Data Sources"
)]
pub async fn list_data_sources(
    State(service): State<DataSourceServiceState>,
) -> AppResult<Json<Vec<DataSourceResponse>>> {
    Ok(Json(service.list().await?))
}

#[utoipa::path(
    post,
    path = "/api/config/datasource",
    request_body = DataSourceDraft,
    responses(
        (status = 201, description = "Data source added", body = DataSourceCreated),
        (status = 400, description = "Invalid fields"),
        (status = 409, description = "A data source with this name exists")
    ),
    tag = "Data Sources"
)]
pub async fn add_data_source(
    State(service): State<DataSourceServiceState>,
    AppJson(payload): AppJson<DataSourceDraft>,
) -> AppResult<(StatusCode, Json<DataSourceCreated>)> {
    let created = service.add(payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    put,
    path = "/api/config/datasource/{name}",
    params(
        ("name" = String, Path, description = "Data source name")
    ),
    request_body = DataSourcePatch,
    responses(
        (status = 200, description = "Data source updated", body = DataSourceResponse),
        (status = 400, description = "Invalid fields"),
        (status = 404, description = "Data source not found")
    ),
    tag = "Data Sources"
)]
pub async fn update_data_source(
    State(service): State<DataSourceServiceState>,
    Path(name): Path<String>,
    AppJson(payload): AppJson<DataSourcePatch>,
) -> AppResult<Json<DataSourceResponse>> {
    Ok(Json(service.update(&name, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/api/config/datasource/{name}",
    params(
        ("name" = String, Path, description = "Data source name")
    ),
    responses(
        (status = 200, description = "Data source deleted", body = MessageResponse),
        (status = 404, description = "Data source not found")
    ),
    tag = "Data Sources"
)]
pub async fn delete_data_source(
    State(service): State<DataSourceServiceState>,
    Path(name): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    service.delete(&name).await?;
    Ok(Json(MessageResponse::ok(format!(
        "Data source '{}' deleted",
        name
    ))))
}

#[utoipa::path(
    post,
    path = "/api/config/datasource/set-default",
    request_body = SetDefaultDataSourceRequest,
    responses(
        (status = 200, description = "Default data source changed", body = MessageResponse),
        (status = 400, description = "Name missing"),
        (status = 404, description = "Data source not found or disabled")
    ),
    tag = "Data Sources"
)]
pub async fn set_default_data_source(
    State(service): State<DataSourceServiceState>,
    AppJson(payload): AppJson<SetDefaultDataSourceRequest>,
) -> AppResult<Json<MessageResponse>> {
    service.set_default(&payload.name).await?;
    Ok(Json(MessageResponse::ok(format!(
        "Default data source set to '{}'",
        payload.name.trim()
    ))))
}

#[utoipa::path(
    get,
    path = "/api/config/datasource/resolve",
    params(ResolveDataSourcesQuery),
    responses(
        (status = 200, description = "Enabled sources in fallback order", body = Vec<DataSourceResponse>),
        (status = 400, description = "Unknown market category")
    ),
    tag = "Data Sources"
)]
pub async fn resolve_data_sources(
    State(service): State<DataSourceServiceState>,
    MarketFilter(market): MarketFilter,
) -> Json<Vec<DataSourceResponse>> {
    Json(service.resolve(market).await)
}
