//! State behind the operator settings page.
//!
//! The workbench never edits its lists locally: every mutation goes through
//! the client, and a successful one is followed by a fresh fetch. Failures
//! end up in the notification queue instead of propagating.

use std::collections::{BTreeMap, VecDeque};

use serde_json::Value as JsonValue;

use super::{ClientError, ClientResult, ConfigClient};
use crate::domain::models::{
    ConfigKind, ConnectionTestRequest, ConnectionTestResult, DataSourceDraft, DataSourcePatch, DataSourceResponse,
    DatabaseConfigDraft, DatabaseConfigPatch, DatabaseConfigResponse, LlmConfigResponse,
    MarketCategory, ProviderTemplate, SaveLlmConfigRequest, SimplifiedLlmConfigRequest,
    SimplifiedLlmResponse,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub level: NoticeLevel,
    pub message: String,
    /// Field-level messages of a rejected form, keyed by field name.
    pub fields: BTreeMap<String, Vec<String>>,
}

impl Notification {
    fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    fn from_error(action: &str, error: &ClientError) -> Self {
        let message = match error {
            ClientError::Transport(_) => format!("{}: the configuration service is unreachable", action),
            ClientError::Service { message, .. } => format!("{}: {}", action, message),
            other => format!("{}: {}", action, other),
        };
        Self {
            level: NoticeLevel::Error,
            message,
            fields: error.field_errors(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    /// Case-insensitive match against names and descriptions.
    pub text: String,
    pub enabled: Option<bool>,
    pub market: Option<MarketCategory>,
}

impl Filters {
    fn matches_text(&self, candidates: &[Option<&str>]) -> bool {
        let needle = self.text.trim().to_lowercase();
        needle.is_empty()
            || candidates
                .iter()
                .flatten()
                .any(|c| c.to_lowercase().contains(&needle))
    }

    fn matches_enabled(&self, enabled: bool) -> bool {
        self.enabled.map_or(true, |wanted| wanted == enabled)
    }
}

/// The form currently open. `original` is the key of the record under edit,
/// `None` for a new one.
#[derive(Debug, Clone)]
pub enum Draft {
    DataSource {
        original: Option<String>,
        form: DataSourceDraft,
    },
    Database {
        original: Option<String>,
        form: DatabaseConfigDraft,
    },
    Llm(SaveLlmConfigRequest),
    Model {
        original: Option<String>,
        form: SimplifiedLlmConfigRequest,
    },
}

pub struct SettingsWorkbench {
    client: ConfigClient,
    data_sources: Vec<DataSourceResponse>,
    databases: Vec<DatabaseConfigResponse>,
    llm_configs: Vec<LlmConfigResponse>,
    models: Vec<SimplifiedLlmResponse>,
    settings: BTreeMap<String, JsonValue>,
    templates: Vec<ProviderTemplate>,
    pub filters: Filters,
    draft: Option<Draft>,
    last_test: Option<ConnectionTestResult>,
    notifications: VecDeque<Notification>,
}

impl SettingsWorkbench {
    pub fn new(client: ConfigClient) -> Self {
        Self {
            client,
            data_sources: Vec::new(),
            databases: Vec::new(),
            llm_configs: Vec::new(),
            models: Vec::new(),
            settings: BTreeMap::new(),
            templates: Vec::new(),
            filters: Filters::default(),
            draft: None,
            last_test: None,
            notifications: VecDeque::new(),
        }
    }

    /// Refetches every list. On failure the previous lists stay as they were.
    pub async fn refresh(&mut self) -> bool {
        let loaded = self.load_all().await;
        self.settle("Loading configuration", loaded)
            .map(|(data_sources, databases, llm_configs, models, settings, templates)| {
                self.data_sources = data_sources;
                self.databases = databases;
                self.llm_configs = llm_configs;
                self.models = models;
                self.settings = settings;
                self.templates = templates;
            })
            .is_some()
    }

    #[allow(clippy::type_complexity)]
    async fn load_all(
        &self,
    ) -> ClientResult<(
        Vec<DataSourceResponse>,
        Vec<DatabaseConfigResponse>,
        Vec<LlmConfigResponse>,
        Vec<SimplifiedLlmResponse>,
        BTreeMap<String, JsonValue>,
        Vec<ProviderTemplate>,
    )> {
        Ok((
            self.client.list_data_sources().await?,
            self.client.list_database_configs().await?,
            self.client.list_llm_configs().await?,
            self.client.list_models().await?,
            self.client.get_settings().await?,
            self.client.llm_templates().await?,
        ))
    }

    pub fn data_sources(&self) -> Vec<&DataSourceResponse> {
        self.data_sources
            .iter()
            .filter(|s| self.filters.matches_enabled(s.enabled))
            .filter(|s| {
                self.filters.matches_text(&[
                    Some(s.name.as_str()),
                    Some(s.source_type.as_str()),
                    s.description.as_deref(),
                ])
            })
            .filter(|s| match self.filters.market {
                Some(market) => {
                    s.market_categories.is_empty() || s.market_categories.contains(&market)
                },
                None => true,
            })
            .collect()
    }

    pub fn databases(&self) -> Vec<&DatabaseConfigResponse> {
        self.databases
            .iter()
            .filter(|d| self.filters.matches_enabled(d.enabled))
            .filter(|d| {
                self.filters.matches_text(&[
                    Some(d.name.as_str()),
                    Some(d.host.as_str()),
                    d.description.as_deref(),
                ])
            })
            .collect()
    }

    pub fn llm_configs(&self) -> Vec<&LlmConfigResponse> {
        self.llm_configs
            .iter()
            .filter(|c| self.filters.matches_enabled(c.enabled))
            .filter(|c| {
                self.filters.matches_text(&[
                    Some(c.name.as_str()),
                    Some(c.display_name.as_str()),
                    Some(c.model.as_str()),
                ])
            })
            .collect()
    }

    pub fn models(&self) -> Vec<&SimplifiedLlmResponse> {
        self.models
            .iter()
            .filter(|m| self.filters.matches_enabled(m.enabled))
            .filter(|m| {
                self.filters.matches_text(&[
                    Some(m.provider_name.as_str()),
                    Some(m.model_name.as_str()),
                    Some(m.model_display_name.as_str()),
                    m.description.as_deref(),
                ])
            })
            .collect()
    }

    pub fn settings(&self) -> &BTreeMap<String, JsonValue> {
        &self.settings
    }

    pub fn templates(&self) -> &[ProviderTemplate] {
        &self.templates
    }

    pub fn default_data_source(&self) -> Option<&str> {
        self.data_sources
            .iter()
            .find(|s| s.is_default)
            .map(|s| s.name.as_str())
    }

    pub fn last_test(&self) -> Option<&ConnectionTestResult> {
        self.last_test.as_ref()
    }

    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.iter()
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    // Drafts

    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    pub fn draft_mut(&mut self) -> Option<&mut Draft> {
        self.draft.as_mut()
    }

    pub fn close_draft(&mut self) {
        self.draft = None;
    }

    pub fn new_data_source(&mut self) {
        self.draft = Some(Draft::DataSource {
            original: None,
            form: DataSourceDraft {
                enabled: true,
                ..Default::default()
            },
        });
    }

    pub fn edit_data_source(&mut self, name: &str) -> bool {
        let Some(source) = self.data_sources.iter().find(|s| s.name == name) else {
            return self.not_loaded("Data source", name);
        };
        let form = DataSourceDraft {
            name: Some(source.name.clone()),
            source_type: source.source_type.parse().ok(),
            api_key: None,
            api_secret: None,
            endpoint: source.endpoint.clone(),
            timeout: source.timeout,
            rate_limit: source.rate_limit,
            enabled: source.enabled,
            priority: source.priority,
            config_params: source.config_params.clone(),
            market_categories: source.market_categories.clone(),
            description: source.description.clone(),
        };
        self.draft = Some(Draft::DataSource {
            original: Some(source.name.clone()),
            form,
        });
        true
    }

    pub fn new_database(&mut self) {
        self.draft = Some(Draft::Database {
            original: None,
            form: DatabaseConfigDraft {
                enabled: true,
                ..Default::default()
            },
        });
    }

    pub fn edit_database(&mut self, name: &str) -> bool {
        let Some(db) = self.databases.iter().find(|d| d.name == name) else {
            return self.not_loaded("Database", name);
        };
        let form = DatabaseConfigDraft {
            name: Some(db.name.clone()),
            kind: db.database_type.parse().ok(),
            host: Some(db.host.clone()),
            port: Some(db.port),
            username: db.username.clone(),
            password: None,
            database: db.database.clone(),
            connection_params: db.connection_params.clone(),
            pool_size: Some(db.pool_size),
            max_overflow: Some(db.max_overflow),
            enabled: db.enabled,
            description: db.description.clone(),
        };
        self.draft = Some(Draft::Database {
            original: Some(db.name.clone()),
            form,
        });
        true
    }

    /// Opens a new LLM form prefilled from a provider template, or blank
    /// when the template is unknown.
    pub fn new_llm_config(&mut self, template: Option<&str>) {
        let form = match template.and_then(|t| self.templates.iter().find(|p| p.name == t)) {
            Some(t) => SaveLlmConfigRequest {
                name: Some(t.name.clone()),
                display_name: Some(t.display_name.clone()),
                model: Some(t.model.clone()),
                base_url: Some(t.base_url.clone()),
                temperature: t.temperature,
                max_tokens: t.max_tokens,
                timeout: t.timeout,
                ..Default::default()
            },
            None => SaveLlmConfigRequest::default(),
        };
        self.draft = Some(Draft::Llm(form));
    }

    pub fn edit_llm_config(&mut self, id: &str) -> bool {
        let Some(config) = self.llm_configs.iter().find(|c| c.id == id) else {
            return self.not_loaded("LLM config", id);
        };
        self.draft = Some(Draft::Llm(SaveLlmConfigRequest {
            id: Some(config.id.clone()),
            name: Some(config.name.clone()),
            display_name: Some(config.display_name.clone()),
            model: Some(config.model.clone()),
            api_key: None,
            base_url: config.base_url.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.timeout,
            enabled: config.enabled,
        }));
        true
    }

    pub fn new_model(&mut self) {
        self.draft = Some(Draft::Model {
            original: None,
            form: SimplifiedLlmConfigRequest::default(),
        });
    }

    pub fn edit_model(&mut self, id: &str) -> bool {
        let Some(model) = self.models.iter().find(|m| m.id == id) else {
            return self.not_loaded("Model config", id);
        };
        let form = SimplifiedLlmConfigRequest {
            provider: Some(model.provider),
            provider_name: Some(model.provider_name.clone()),
            model_name: Some(model.model_name.clone()),
            model_display_name: Some(model.model_display_name.clone()),
            api_key: None,
            api_base: model.api_base.clone(),
            temperature: model.temperature,
            max_tokens: model.max_tokens,
            timeout: model.timeout,
            enabled: model.enabled,
            capabilities: model.capabilities.clone(),
            suitable_for: model.suitable_for.clone(),
            input_price: model.input_price,
            output_price: model.output_price,
            currency: model.currency,
            description: model.description.clone(),
        };
        self.draft = Some(Draft::Model {
            original: Some(model.id.clone()),
            form,
        });
        true
    }

    /// Submits the open draft. The draft survives a failure so the operator
    /// can fix the reported fields; success closes it and refetches.
    pub async fn save_draft(&mut self) -> bool {
        let Some(draft) = self.draft.clone() else {
            return false;
        };

        let (action, result) = match draft {
            Draft::DataSource {
                original: None,
                form,
            } => (
                "Adding data source",
                self.client.add_data_source(&form).await.map(|_| ()),
            ),
            Draft::DataSource {
                original: Some(name),
                form,
            } => (
                "Updating data source",
                self.client
                    .update_data_source(&name, &data_source_patch(form))
                    .await
                    .map(|_| ()),
            ),
            Draft::Database {
                original: None,
                form,
            } => (
                "Adding database",
                self.client.add_database_config(&form).await.map(|_| ()),
            ),
            Draft::Database {
                original: Some(name),
                form,
            } => (
                "Updating database",
                self.client
                    .update_database_config(&name, &database_patch(form))
                    .await
                    .map(|_| ()),
            ),
            Draft::Llm(form) => (
                "Saving LLM config",
                self.client.save_llm_config(&form).await.map(|_| ()),
            ),
            Draft::Model {
                original: None,
                form,
            } => (
                "Adding model",
                self.client.add_model(&form).await.map(|_| ()),
            ),
            Draft::Model {
                original: Some(id),
                form,
            } => (
                "Updating model",
                self.client.update_model(&id, &form).await.map(|_| ()),
            ),
        };

        if self.settle(action, result).is_none() {
            return false;
        }
        self.notifications
            .push_back(Notification::success(format!("{}: done", action)));
        self.draft = None;
        self.refresh().await;
        true
    }

    // Direct actions

    pub async fn delete_data_source(&mut self, name: &str) -> bool {
        let result = self.client.delete_data_source(name).await;
        self.mutated("Deleting data source", result.map(|r| r.message))
            .await
    }

    pub async fn set_default_data_source(&mut self, name: &str) -> bool {
        let result = self.client.set_default_data_source(name).await;
        self.mutated("Setting default data source", result.map(|r| r.message))
            .await
    }

    pub async fn delete_database(&mut self, name: &str) -> bool {
        let result = self.client.delete_database_config(name).await;
        self.mutated("Deleting database", result.map(|r| r.message))
            .await
    }

    pub async fn delete_llm_config(&mut self, id: &str) -> bool {
        let result = self.client.delete_llm_config(id).await;
        self.mutated("Deleting LLM config", result.map(|r| r.message))
            .await
    }

    pub async fn delete_model(&mut self, id: &str) -> bool {
        let result = self.client.delete_model(id).await;
        self.mutated("Deleting model", result.map(|r| r.message))
            .await
    }

    pub async fn set_default_model(&mut self, id: &str) -> bool {
        let result = self.client.set_default_model(id).await;
        self.mutated("Setting default model", result.map(|r| r.message))
            .await
    }

    pub async fn save_settings(&mut self, changes: BTreeMap<String, JsonValue>) -> bool {
        let result = self.client.update_settings(changes).await;
        self.mutated("Saving settings", result.map(|_| "Settings saved".to_string()))
            .await
    }

    pub async fn reload(&mut self) -> bool {
        let result = self.client.reload_config().await;
        self.mutated("Reloading configuration", result.map(|r| r.message))
            .await
    }

    pub async fn test_database(&mut self, name: &str) -> bool {
        let result = self.client.test_database_config(name, None).await;
        self.record_test("Testing database", result)
    }

    pub async fn test_llm_config(&mut self, id: &str) -> bool {
        let result = self.client.test_llm_config(id).await;
        self.record_test("Testing LLM config", result)
    }

    /// Probes the open form as it stands, without saving it. Secrets left
    /// blank on an edit form are not filled in from the stored record.
    pub async fn test_draft(&mut self) -> bool {
        let Some(draft) = self.draft.as_ref() else {
            self.notifications.push_back(Notification {
                level: NoticeLevel::Error,
                message: "No form is open".to_string(),
                fields: BTreeMap::new(),
            });
            return false;
        };
        let result = match draft_test_request(draft) {
            Ok(request) => self.client.test_connection(&request).await,
            Err(e) => Err(e),
        };
        self.record_test("Testing connection", result)
    }

    /// Keeps the probe outcome. A probe that ran but failed is a warning,
    /// not an error.
    fn record_test(&mut self, action: &str, result: ClientResult<ConnectionTestResult>) -> bool {
        let Some(outcome) = self.settle(action, result) else {
            return false;
        };
        let notification = if outcome.success {
            Notification::success(outcome.message.clone())
        } else {
            Notification {
                level: NoticeLevel::Warning,
                message: outcome.message.clone(),
                fields: BTreeMap::new(),
            }
        };
        self.notifications.push_back(notification);
        let success = outcome.success;
        self.last_test = Some(outcome);
        success
    }

    async fn mutated(&mut self, action: &str, result: ClientResult<String>) -> bool {
        let Some(message) = self.settle(action, result) else {
            return false;
        };
        self.notifications.push_back(Notification::success(message));
        self.refresh().await;
        true
    }

    fn settle<T>(&mut self, action: &str, result: ClientResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(action, error = %e, "Config API call failed");
                self.notifications
                    .push_back(Notification::from_error(action, &e));
                None
            },
        }
    }

    fn not_loaded(&mut self, what: &str, key: &str) -> bool {
        self.notifications.push_back(Notification {
            level: NoticeLevel::Error,
            message: format!("{} '{}' is not loaded", what, key),
            fields: BTreeMap::new(),
        });
        false
    }
}

/// Model forms are probed through the base LLM shape of their provider.
fn draft_test_request(draft: &Draft) -> ClientResult<ConnectionTestRequest> {
    let (kind, config) = match draft {
        Draft::DataSource { form, .. } => (ConfigKind::Datasource, serde_json::to_value(form)),
        Draft::Database { form, .. } => (ConfigKind::Database, serde_json::to_value(form)),
        Draft::Llm(form) => (ConfigKind::Llm, serde_json::to_value(form)),
        Draft::Model { form, .. } => {
            let base = SaveLlmConfigRequest {
                name: form.provider.map(|p| p.as_str().to_string()),
                display_name: form.provider_name.clone(),
                model: form.model_name.clone(),
                api_key: form.api_key.clone(),
                base_url: form.api_base.clone(),
                temperature: form.temperature,
                max_tokens: form.max_tokens,
                ..Default::default()
            };
            (ConfigKind::Llm, serde_json::to_value(&base))
        },
    };
    let config = config.map_err(|e| ClientError::InvalidRequest(e.to_string()))?;

    Ok(ConnectionTestRequest {
        kind,
        config,
        timeout_secs: None,
    })
}

/// Every field is sent; blank secrets stay out so the stored ones are kept.
fn data_source_patch(form: DataSourceDraft) -> DataSourcePatch {
    DataSourcePatch {
        source_type: form.source_type,
        api_key: form.api_key.filter(|k| !k.trim().is_empty()),
        api_secret: form.api_secret.filter(|k| !k.trim().is_empty()),
        endpoint: form.endpoint,
        timeout: form.timeout,
        rate_limit: form.rate_limit,
        enabled: Some(form.enabled),
        priority: Some(form.priority),
        config_params: Some(form.config_params),
        market_categories: Some(form.market_categories),
        description: form.description,
    }
}

fn database_patch(form: DatabaseConfigDraft) -> DatabaseConfigPatch {
    DatabaseConfigPatch {
        kind: form.kind,
        host: form.host,
        port: form.port,
        username: form.username,
        password: form.password.filter(|p| !p.trim().is_empty()),
        database: form.database,
        connection_params: Some(form.connection_params),
        pool_size: form.pool_size,
        max_overflow: form.max_overflow,
        enabled: Some(form.enabled),
        description: form.description,
    }
}
