//! Typed HTTP client for the configuration API.
//!
//! Every endpoint has one method with the service's own request and response
//! types. The client checks only that required fields are present before
//! sending; everything else is the service's call.

mod error;
mod workbench;

pub use error::*;
pub use workbench::*;

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use url::Url;

use crate::domain::models::{
    ActiveLlmConfig, ConfigSnapshot, ConnectionTestRequest, ConnectionTestResult,
    DataSourceCreated, DataSourceDraft, DataSourcePatch, DataSourceResponse,
    DatabaseConfigCreated, DatabaseConfigDraft, DatabaseConfigPatch, DatabaseConfigResponse,
    ImportReport, LlmConfigResponse, LlmTestRequest, MarketCategory, MessageResponse,
    MigrateLegacyRequest, MigrationReport, ProbeOptions, ProviderTemplate, ReloadResponse,
    ResolveDataSourcesQuery, SaveLlmConfigRequest, SetDefaultDataSourceRequest,
    SettingsMetaResponse, SettingsPayload, SimplifiedLlmConfigRequest, SimplifiedLlmResponse,
    SystemConfigResponse,
};
use crate::error::ErrorResponse;

/// Slightly above the server's own request timeout so the server answers first.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(130);

#[derive(Debug, Clone)]
pub struct ConfigClient {
    http: Client,
    base_url: Url,
}

impl ConfigClient {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidRequest(format!("Invalid base URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidRequest(format!(
                "Invalid base URL: {}",
                base_url
            )));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::Transport)?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // System

    pub async fn system_config(&self) -> ClientResult<SystemConfigResponse> {
        self.send(self.request(Method::GET, &["api", "config", "system"]))
            .await
    }

    pub async fn get_settings(&self) -> ClientResult<BTreeMap<String, JsonValue>> {
        let payload: SettingsPayload = self
            .send(self.request(Method::GET, &["api", "config", "settings"]))
            .await?;
        Ok(payload.settings)
    }

    pub async fn update_settings(
        &self,
        settings: BTreeMap<String, JsonValue>,
    ) -> ClientResult<BTreeMap<String, JsonValue>> {
        if settings.keys().any(|k| k.trim().is_empty()) {
            return Err(ClientError::InvalidRequest(
                "setting keys cannot be blank".to_string(),
            ));
        }
        let payload: SettingsPayload = self
            .send(
                self.request(Method::PUT, &["api", "config", "settings"])
                    .json(&SettingsPayload { settings }),
            )
            .await?;
        Ok(payload.settings)
    }

    pub async fn settings_meta(&self) -> ClientResult<SettingsMetaResponse> {
        self.send(self.request(Method::GET, &["api", "config", "settings", "meta"]))
            .await
    }

    pub async fn test_connection(
        &self,
        request: &ConnectionTestRequest,
    ) -> ClientResult<ConnectionTestResult> {
        if !request.config.is_object() {
            return Err(ClientError::InvalidRequest(
                "config must be a JSON object".to_string(),
            ));
        }
        self.send(self.request(Method::POST, &["api", "config", "test"]).json(request))
            .await
    }

    pub async fn export_config(&self) -> ClientResult<ConfigSnapshot> {
        self.send(self.request(Method::POST, &["api", "config", "export"]))
            .await
    }

    pub async fn import_config(&self, snapshot: &ConfigSnapshot) -> ClientResult<ImportReport> {
        self.send(
            self.request(Method::POST, &["api", "config", "import"])
                .json(snapshot),
        )
        .await
    }

    pub async fn migrate_legacy(&self, force: bool) -> ClientResult<MigrationReport> {
        self.send(
            self.request(Method::POST, &["api", "config", "migrate-legacy"])
                .json(&MigrateLegacyRequest { force }),
        )
        .await
    }

    pub async fn reload_config(&self) -> ClientResult<ReloadResponse> {
        self.send(self.request(Method::POST, &["api", "config", "reload"]))
            .await
    }

    // Data sources

    pub async fn list_data_sources(&self) -> ClientResult<Vec<DataSourceResponse>> {
        self.send(self.request(Method::GET, &["api", "config", "datasource"]))
            .await
    }

    pub async fn add_data_source(
        &self,
        draft: &DataSourceDraft,
    ) -> ClientResult<DataSourceCreated> {
        require("name", draft.name.as_deref())?;
        if draft.source_type.is_none() {
            return Err(missing("type"));
        }
        self.send(
            self.request(Method::POST, &["api", "config", "datasource"])
                .json(draft),
        )
        .await
    }

    pub async fn update_data_source(
        &self,
        name: &str,
        patch: &DataSourcePatch,
    ) -> ClientResult<DataSourceResponse> {
        require("name", Some(name))?;
        self.send(
            self.request(Method::PUT, &["api", "config", "datasource", name])
                .json(patch),
        )
        .await
    }

    pub async fn delete_data_source(&self, name: &str) -> ClientResult<MessageResponse> {
        require("name", Some(name))?;
        self.send(self.request(Method::DELETE, &["api", "config", "datasource", name]))
            .await
    }

    pub async fn set_default_data_source(&self, name: &str) -> ClientResult<MessageResponse> {
        require("name", Some(name))?;
        self.send(
            self.request(Method::POST, &["api", "config", "datasource", "set-default"])
                .json(&SetDefaultDataSourceRequest {
                    name: name.to_string(),
                }),
        )
        .await
    }

    pub async fn resolve_data_sources(
        &self,
        market: Option<MarketCategory>,
    ) -> ClientResult<Vec<DataSourceResponse>> {
        self.send(
            self.request(Method::GET, &["api", "config", "datasource", "resolve"])
                .query(&ResolveDataSourcesQuery { market }),
        )
        .await
    }

    // Databases

    pub async fn list_database_configs(&self) -> ClientResult<Vec<DatabaseConfigResponse>> {
        self.send(self.request(Method::GET, &["api", "config", "database"]))
            .await
    }

    pub async fn add_database_config(
        &self,
        draft: &DatabaseConfigDraft,
    ) -> ClientResult<DatabaseConfigCreated> {
        require("name", draft.name.as_deref())?;
        if draft.kind.is_none() {
            return Err(missing("type"));
        }
        require("host", draft.host.as_deref())?;
        self.send(
            self.request(Method::POST, &["api", "config", "database"])
                .json(draft),
        )
        .await
    }

    pub async fn get_database_config(&self, name: &str) -> ClientResult<DatabaseConfigResponse> {
        require("name", Some(name))?;
        self.send(self.request(Method::GET, &["api", "config", "database", name]))
            .await
    }

    pub async fn update_database_config(
        &self,
        name: &str,
        patch: &DatabaseConfigPatch,
    ) -> ClientResult<DatabaseConfigResponse> {
        require("name", Some(name))?;
        self.send(
            self.request(Method::PUT, &["api", "config", "database", name])
                .json(patch),
        )
        .await
    }

    pub async fn delete_database_config(&self, name: &str) -> ClientResult<MessageResponse> {
        require("name", Some(name))?;
        self.send(self.request(Method::DELETE, &["api", "config", "database", name]))
            .await
    }

    pub async fn test_database_config(
        &self,
        name: &str,
        timeout_secs: Option<u64>,
    ) -> ClientResult<ConnectionTestResult> {
        require("name", Some(name))?;
        self.send(
            self.request(Method::POST, &["api", "config", "database", name, "test"])
                .json(&ProbeOptions { timeout_secs }),
        )
        .await
    }

    // Simplified model configs

    pub async fn list_models(&self) -> ClientResult<Vec<SimplifiedLlmResponse>> {
        self.send(self.request(Method::GET, &["api", "config", "llm"]))
            .await
    }

    pub async fn add_model(
        &self,
        request: &SimplifiedLlmConfigRequest,
    ) -> ClientResult<SimplifiedLlmResponse> {
        check_model(request)?;
        self.send(
            self.request(Method::POST, &["api", "config", "llm"])
                .json(request),
        )
        .await
    }

    pub async fn update_model(
        &self,
        id: &str,
        request: &SimplifiedLlmConfigRequest,
    ) -> ClientResult<SimplifiedLlmResponse> {
        require("id", Some(id))?;
        check_model(request)?;
        self.send(
            self.request(Method::PUT, &["api", "config", "llm", id])
                .json(request),
        )
        .await
    }

    pub async fn delete_model(&self, id: &str) -> ClientResult<MessageResponse> {
        require("id", Some(id))?;
        self.send(self.request(Method::DELETE, &["api", "config", "llm", id]))
            .await
    }

    pub async fn set_default_model(&self, id: &str) -> ClientResult<MessageResponse> {
        require("id", Some(id))?;
        self.send(self.request(Method::POST, &["api", "config", "llm", id, "set-default"]))
            .await
    }

    // LLM configs

    pub async fn list_llm_configs(&self) -> ClientResult<Vec<LlmConfigResponse>> {
        self.send(self.request(Method::GET, &["api", "llm"])).await
    }

    pub async fn save_llm_config(
        &self,
        request: &SaveLlmConfigRequest,
    ) -> ClientResult<LlmConfigResponse> {
        require("name", request.name.as_deref())?;
        require("display_name", request.display_name.as_deref())?;
        require("model", request.model.as_deref())?;
        self.send(self.request(Method::POST, &["api", "llm"]).json(request))
            .await
    }

    pub async fn delete_llm_config(&self, id: &str) -> ClientResult<MessageResponse> {
        require("id", Some(id))?;
        self.send(self.request(Method::DELETE, &["api", "llm", id]))
            .await
    }

    pub async fn test_llm_config(&self, id: &str) -> ClientResult<ConnectionTestResult> {
        require("config_id", Some(id))?;
        self.send(
            self.request(Method::POST, &["api", "llm", "test"])
                .json(&LlmTestRequest {
                    config_id: id.to_string(),
                }),
        )
        .await
    }

    pub async fn active_llm_config(&self, provider: Option<&str>) -> ClientResult<ActiveLlmConfig> {
        let mut request = self.request(Method::GET, &["api", "llm", "active"]);
        if let Some(provider) = provider.map(str::trim).filter(|p| !p.is_empty()) {
            request = request.query(&[("provider", provider)]);
        }
        self.send(request).await
    }

    pub async fn llm_templates(&self) -> ClientResult<Vec<ProviderTemplate>> {
        self.send(self.request(Method::GET, &["api", "llm", "templates"]))
            .await
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let mut url = self.base_url.clone();
        // Checked in the constructor.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        tracing::debug!(method = %method, url = %url, "Config API request");
        self.http.request(method, url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = request.send().await.map_err(ClientError::Transport)?;
        let status = response.status();
        let body = response.bytes().await.map_err(ClientError::Transport)?;

        if !status.is_success() {
            return Err(service_error(status.as_u16(), &body));
        }

        serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

fn service_error(status: u16, body: &[u8]) -> ClientError {
    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(envelope) => ClientError::Service {
            status,
            code: envelope.error.code,
            message: envelope.error.message,
            details: envelope.error.details,
        },
        Err(_) => ClientError::Service {
            status,
            code: "HTTP_ERROR".to_string(),
            message: String::from_utf8_lossy(body).trim().to_string(),
            details: None,
        },
    }
}

fn missing(field: &str) -> ClientError {
    ClientError::InvalidRequest(format!("{} is required", field))
}

fn require(field: &str, value: Option<&str>) -> ClientResult<()> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(missing(field)),
    }
}

fn check_model(request: &SimplifiedLlmConfigRequest) -> ClientResult<()> {
    if request.provider.is_none() {
        return Err(missing("provider"));
    }
    require("model_name", request.model_name.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ConfigClient {
        ConfigClient::new("http://127.0.0.1:9/").unwrap()
    }

    #[test]
    fn paths_are_joined_and_escaped() {
        let client = client();
        let request = client
            .request(Method::GET, &["api", "config", "database", "main db"])
            .build()
            .unwrap();
        assert_eq!(
            request.url().as_str(),
            "http://127.0.0.1:9/api/config/database/main%20db"
        );
    }

    #[test]
    fn base_path_prefix_is_kept() {
        let client = ConfigClient::new("http://127.0.0.1:9/prefix").unwrap();
        let request = client.request(Method::GET, &["api", "llm"]).build().unwrap();
        assert_eq!(request.url().path(), "/prefix/api/llm");
    }

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(matches!(
            ConfigClient::new("not a url"),
            Err(ClientError::InvalidRequest(_))
        ));
        assert!(matches!(
            ConfigClient::new("mailto:ops@example.com"),
            Err(ClientError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn missing_required_fields_never_reach_the_network() {
        let client = client();

        let err = client
            .add_data_source(&DataSourceDraft::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(ref m) if m == "name is required"));

        let err = client
            .save_llm_config(&SaveLlmConfigRequest {
                name: Some("deepseek".into()),
                display_name: Some("  ".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(ref m) if m == "display_name is required"));

        let err = client
            .add_model(&SimplifiedLlmConfigRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(ref m) if m == "provider is required"));

        assert!(matches!(
            client.delete_data_source("").await,
            Err(ClientError::InvalidRequest(_))
        ));
    }

    #[test]
    fn error_envelope_becomes_service_error() {
        let body = br#"{"error":{"code":"NOT_FOUND","message":"Resource not found: x"}}"#;
        match service_error(404, body) {
            ClientError::Service {
                status,
                code,
                message,
                details,
            } => {
                assert_eq!(status, 404);
                assert_eq!(code, "NOT_FOUND");
                assert_eq!(message, "Resource not found: x");
                assert!(details.is_none());
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn plain_error_bodies_are_kept_as_message() {
        let err = service_error(502, b"Bad Gateway\n");
        assert_eq!(err.code(), Some("HTTP_ERROR"));
        assert!(err.to_string().starts_with("Bad Gateway"));
    }
}
