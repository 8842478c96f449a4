use std::fs;
use std::path::Path;

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tradedesk Config API",
        version = "0.1.0",
        description = "Data sources, databases, LLM providers and system settings for the Tradedesk analysis platform",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8000", description = "Local development server"),
        (url = "/", description = "Current server")
    ),
    paths(
        crate::api::handlers::health,
        crate::api::handlers::ready,
        crate::api::handlers::get_system_config,
        crate::api::handlers::get_settings,
        crate::api::handlers::update_settings,
        crate::api::handlers::get_settings_meta,
        crate::api::handlers::test_connection,
        crate::api::handlers::export_config,
        crate::api::handlers::import_config,
        crate::api::handlers::reload_config,
        crate::api::handlers::list_data_sources,
        crate::api::handlers::add_data_source,
        crate::api::handlers::update_data_source,
        crate::api::handlers::delete_data_source,
        crate::api::handlers::set_default_data_source,
        crate::api::handlers::resolve_data_sources,
        crate::api::handlers::list_database_configs,
        crate::api::handlers::add_database_config,
        crate::api::handlers::get_database_config,
        crate::api::handlers::update_database_config,
        crate::api::handlers::delete_database_config,
        crate::api::handlers::test_database_config,
        crate::api::handlers::list_models,
        crate::api::handlers::add_model,
        crate::api::handlers::update_model,
        crate::api::handlers::delete_model,
        crate::api::handlers::set_default_model,
        crate::api::handlers::migrate_legacy,
        crate::api::handlers::list_llm_configs,
        crate::api::handlers::save_llm_config,
        crate::api::handlers::delete_llm_config,
        crate::api::handlers::test_llm_config,
        crate::api::handlers::active_llm_config,
        crate::api::handlers::llm_templates,
    ),
    components(schemas(
        crate::api::handlers::HealthResponse,
        crate::api::handlers::ReadyResponse,
        crate::api::handlers::HealthChecks,
        crate::api::handlers::CheckStatus,
        crate::domain::models::DataSourceType,
        crate::domain::models::MarketCategory,
        crate::domain::models::DataSourceDraft,
        crate::domain::models::DataSourcePatch,
        crate::domain::models::DataSourceResponse,
        crate::domain::models::DataSourceCreated,
        crate::domain::models::SetDefaultDataSourceRequest,
        crate::domain::models::DatabaseKind,
        crate::domain::models::DatabaseConfigDraft,
        crate::domain::models::DatabaseConfigPatch,
        crate::domain::models::DatabaseConfigResponse,
        crate::domain::models::DatabaseConfigCreated,
        crate::domain::models::ConfigKind,
        crate::domain::models::ConnectionTestRequest,
        crate::domain::models::ProbeOptions,
        crate::domain::models::ConnectionTestResult,
        crate::domain::models::SaveLlmConfigRequest,
        crate::domain::models::LlmConfigResponse,
        crate::domain::models::LlmTestRequest,
        crate::domain::models::LlmConfigSource,
        crate::domain::models::ActiveLlmConfig,
        crate::domain::models::MessageResponse,
        crate::domain::models::ProviderTemplate,
        crate::domain::models::LlmProvider,
        crate::domain::models::ModelCapability,
        crate::domain::models::Currency,
        crate::domain::models::SimplifiedLlmConfigRequest,
        crate::domain::models::SimplifiedLlmResponse,
        crate::domain::models::MigrateLegacyRequest,
        crate::domain::models::MigrationReport,
        crate::domain::models::SettingSource,
        crate::domain::models::SettingsPayload,
        crate::domain::models::SettingMeta,
        crate::domain::models::SettingsMetaResponse,
        crate::domain::models::SystemConfigResponse,
        crate::domain::models::SimplifiedLlmExport,
        crate::domain::models::ConfigSnapshot,
        crate::domain::models::ImportReport,
        crate::domain::models::ReloadResponse,
    )),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Data Sources", description = "Market data providers and their fallback order"),
        (name = "Databases", description = "Database connection configs"),
        (name = "LLM", description = "LLM provider configs used by the analysis runtime"),
        (name = "Models", description = "Per-provider model catalogue with one default per provider"),
        (name = "System", description = "System settings, connectivity tests, export, import and reload")
    )
)]
pub struct ApiDoc;

/// Writes the pretty-printed API description, creating parent directories.
pub fn generate_openapi_json(
    output_path: impl AsRef<Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let output_path = output_path.as_ref();
    let openapi_json = ApiDoc::openapi().to_pretty_json()?;

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output_path, openapi_json)?;

    Ok(())
}

pub fn get_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
