use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::sqlite::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers::{
    self, ConnectionTestServiceState, DataSourceServiceState, DatabaseConfigServiceState,
    HealthState, LlmConfigServiceState, SimplifiedLlmServiceState, SystemConfigServiceState,
};
use crate::config::{process_env, Settings};
use crate::domain::services::AppServices;
use crate::error::AppResult;
use crate::infrastructure::{NetworkProber, Prober};
use crate::middleware::security_headers_middleware;
use crate::utils::SecretCipher;

/// Wires the production services and loads the first runtime snapshot.
pub async fn create_router(db_pool: SqlitePool, settings: Arc<Settings>) -> AppResult<Router> {
    let cipher = SecretCipher::from_hex(&settings.security.encryption_key)?;
    let prober: Arc<dyn Prober> = Arc::new(NetworkProber::new()?);

    let services = AppServices::new(
        db_pool.clone(),
        cipher,
        prober,
        settings.probe.clone(),
        process_env(),
    );
    let snapshot = services.cache.reload().await?;
    tracing::info!(
        data_sources = snapshot.data_sources.len(),
        llm_candidates = snapshot.llm_candidates.len(),
        "Runtime configuration loaded"
    );

    Ok(build_router(db_pool, services, settings.as_ref()))
}

pub fn build_router(db_pool: SqlitePool, services: AppServices, settings: &Settings) -> Router {
    let health_state = HealthState { db_pool };

    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready).with_state(health_state));

    let data_source_routes = Router::new()
        .route(
            "/",
            get(handlers::list_data_sources).post(handlers::add_data_source),
        )
        .route("/set-default", post(handlers::set_default_data_source))
        .route("/resolve", get(handlers::resolve_data_sources))
        .route(
            "/{name}",
            put(handlers::update_data_source).delete(handlers::delete_data_source),
        )
        .with_state(services.data_sources.clone() as DataSourceServiceState);

    let database_routes = Router::new()
        .route(
            "/",
            get(handlers::list_database_configs).post(handlers::add_database_config),
        )
        .route(
            "/{name}",
            get(handlers::get_database_config)
                .put(handlers::update_database_config)
                .delete(handlers::delete_database_config),
        )
        .route("/{name}/test", post(handlers::test_database_config))
        .with_state(services.databases.clone() as DatabaseConfigServiceState);

    let model_routes = Router::new()
        .route("/", get(handlers::list_models).post(handlers::add_model))
        .route(
            "/{id}",
            put(handlers::update_model).delete(handlers::delete_model),
        )
        .route("/{id}/set-default", post(handlers::set_default_model))
        .with_state(services.models.clone() as SimplifiedLlmServiceState);

    let migration_routes = Router::new()
        .route("/migrate-legacy", post(handlers::migrate_legacy))
        .with_state(services.models.clone() as SimplifiedLlmServiceState);

    let system_routes = Router::new()
        .route("/system", get(handlers::get_system_config))
        .route(
            "/settings",
            get(handlers::get_settings).put(handlers::update_settings),
        )
        .route("/settings/meta", get(handlers::get_settings_meta))
        .route("/export", post(handlers::export_config))
        .route("/import", post(handlers::import_config))
        .route("/reload", post(handlers::reload_config))
        .with_state(services.system.clone() as SystemConfigServiceState);

    let test_routes = Router::new()
        .route("/test", post(handlers::test_connection))
        .with_state(services.connection_tests.clone() as ConnectionTestServiceState);

    let llm_routes = Router::new()
        .route(
            "/",
            get(handlers::list_llm_configs).post(handlers::save_llm_config),
        )
        .route("/test", post(handlers::test_llm_config))
        .route("/active", get(handlers::active_llm_config))
        .route("/templates", get(handlers::llm_templates))
        .route("/{id}", delete(handlers::delete_llm_config))
        .with_state(services.llm.clone() as LlmConfigServiceState);

    let config_routes = Router::new()
        .nest("/datasource", data_source_routes)
        .nest("/database", database_routes)
        .nest("/llm", model_routes)
        .merge(migration_routes)
        .merge(system_routes)
        .merge(test_routes);

    let app = Router::new()
        .merge(public_routes)
        .nest("/api/config", config_routes)
        .nest("/api/llm", llm_routes);

    let origins: Vec<HeaderValue> = settings
        .cors
        .allowed_origins
        .0
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    app.layer(middleware::from_fn(security_headers_middleware))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(settings.server.request_timeout_secs),
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT]),
        )
        .layer(TraceLayer::new_for_http())
}
