use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde_json::{json, Value as JsonValue};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use super::data_source::{data_source_response, seal_data_source};
use super::database_config::{database_config_response, seal_database_config};
use super::llm::{llm_config_response, seal_llm_config};
use super::simplified_llm::{seal_simplified_llm, simplified_llm_response};
use crate::config::EnvLookup;
use crate::domain::models::{
    env_var_for, is_sensitive_key, setting_definition, setting_definitions, ConfigSnapshot,
    DataSourceRecord, DatabaseConfigRecord, ImportReport, LlmConfigRecord, ReloadResponse,
    SettingKind, SettingMeta, SettingSource, SettingsMetaResponse, SimplifiedLlmExport,
    SimplifiedLlmRecord, SystemConfigResponse, SNAPSHOT_VERSION,
};
use crate::error::{AppResult, FieldErrors};
use crate::infrastructure::RuntimeCache;
use crate::repositories::{
    llm_collection, now, Repositories, StoreContents, DATA_SOURCE_COLLECTION,
};
use crate::utils::{mask_secret, SecretCipher};

const MASKED: &str = "****";

/// A setting as the platform sees it after environment overrides.
#[derive(Debug, Clone)]
struct EffectiveSetting {
    value: JsonValue,
    source: SettingSource,
    description: Option<String>,
}

#[derive(Clone)]
pub struct SystemConfigService {
    repos: Repositories,
    cipher: SecretCipher,
    cache: Arc<RuntimeCache>,
    env: EnvLookup,
}

impl SystemConfigService {
    pub fn new(
        repos: Repositories,
        cipher: SecretCipher,
        cache: Arc<RuntimeCache>,
        env: EnvLookup,
    ) -> Self {
        Self {
            repos,
            cipher,
            cache,
            env,
        }
    }

    /// Every collection in one consistent read, secrets masked.
    pub async fn system_config(&self) -> AppResult<SystemConfigResponse> {
        let contents = self.repos.snapshots.read_all().await?;
        let default_data_source = contents.defaults.get(DATA_SOURCE_COLLECTION).cloned();

        let data_sources = contents
            .data_sources
            .iter()
            .map(|r| {
                let is_default = default_data_source.as_deref() == Some(r.name.as_str());
                data_source_response(&self.cipher, r, is_default)
            })
            .collect();
        let databases = contents
            .databases
            .iter()
            .map(|r| database_config_response(&self.cipher, r))
            .collect();
        let llm_configs = contents
            .llm_configs
            .iter()
            .map(|r| llm_config_response(&self.cipher, r))
            .collect();
        let simplified_llm_configs = contents
            .simplified_llm_configs
            .iter()
            .map(|r| {
                let is_default = contents.defaults.get(&llm_collection(&r.provider)) == Some(&r.id);
                simplified_llm_response(&self.cipher, r, is_default)
            })
            .collect();

        Ok(SystemConfigResponse {
            data_sources,
            default_data_source,
            databases,
            llm_configs,
            simplified_llm_configs,
            system_settings: masked_values(&self.effective_settings(&contents.settings)),
        })
    }

    pub async fn get_settings(&self) -> AppResult<BTreeMap<String, JsonValue>> {
        let stored = self.repos.settings.all().await?;
        Ok(masked_values(&self.effective_settings(&stored)))
    }

    /// Writes the given keys; `null` removes a stored value. Keys pinned by
    /// the environment are rejected, and sensitive keys echoed back in their
    /// masked form are left untouched.
    pub async fn update_settings(
        &self,
        updates: BTreeMap<String, JsonValue>,
    ) -> AppResult<BTreeMap<String, JsonValue>> {
        let stored = self.repos.settings.all().await?;
        let effective = self.effective_settings(&stored);
        let current = masked_values(&effective);

        let mut fields = FieldErrors::new();
        let mut accepted = BTreeMap::new();

        for (key, value) in updates {
            let key = key.trim().to_string();
            if key.is_empty() {
                fields.add("settings", "setting keys must not be empty");
                continue;
            }
            let kind = setting_definition(&key)
                .map(|d| d.kind)
                .unwrap_or(SettingKind::Text);
            if self.env_value(&key, kind).is_some() {
                fields.add(
                    &key,
                    format!(
                        "managed by environment variable {} and cannot be changed here",
                        env_var_for(&key)
                    ),
                );
                continue;
            }
            if is_sensitive_key(&key) && is_masked_echo(&value, current.get(&key)) {
                continue;
            }
            if let Err(message) = check_setting_type(&key, &value) {
                fields.add(&key, message);
                continue;
            }
            accepted.insert(key, value);
        }

        fields.into_result()?;

        if !accepted.is_empty() {
            self.repos.settings.upsert_many(&accepted).await?;
            self.cache.refresh().await;
            tracing::info!(keys = ?accepted.keys().collect::<Vec<_>>(), "System settings updated");
        }

        self.get_settings().await
    }

    pub async fn settings_meta(&self) -> AppResult<SettingsMetaResponse> {
        let stored = self.repos.settings.all().await?;
        let settings = self
            .effective_settings(&stored)
            .into_iter()
            .map(|(key, setting)| SettingMeta {
                sensitive: is_sensitive_key(&key),
                editable: setting.source != SettingSource::Environment,
                source: setting.source,
                description: setting.description,
                key,
            })
            .collect();

        Ok(SettingsMetaResponse { settings })
    }

    /// Portable copy of the store with every secret left out.
    pub async fn export(&self) -> AppResult<ConfigSnapshot> {
        let contents = self.repos.snapshots.read_all().await?;

        let simplified_llm_configs = contents
            .simplified_llm_configs
            .iter()
            .map(|r| SimplifiedLlmExport {
                id: Some(r.id.clone()),
                is_default: contents.defaults.get(&llm_collection(&r.provider)) == Some(&r.id),
                config: r.to_request(),
            })
            .collect();

        let snapshot = ConfigSnapshot {
            version: SNAPSHOT_VERSION,
            exported_at: Some(now()),
            data_sources: contents.data_sources.iter().map(|r| r.to_draft()).collect(),
            default_data_source: contents.defaults.get(DATA_SOURCE_COLLECTION).cloned(),
            databases: contents.databases.iter().map(|r| r.to_draft()).collect(),
            llm_configs: contents.llm_configs.iter().map(|r| r.to_request()).collect(),
            simplified_llm_configs,
            system_settings: contents
                .settings
                .into_iter()
                .filter(|(key, _)| !is_sensitive_key(key))
                .collect(),
        };

        tracing::info!(
            data_sources = snapshot.data_sources.len(),
            databases = snapshot.databases.len(),
            llm_configs = snapshot.llm_configs.len(),
            "Configuration exported"
        );
        Ok(snapshot)
    }

    /// Validates the whole snapshot, then swaps it in with one transaction.
    /// Secrets the snapshot leaves out keep their stored value under the
    /// same name or id; nothing is written when any entry is invalid.
    pub async fn import(&self, snapshot: ConfigSnapshot) -> AppResult<ImportReport> {
        let existing = self.repos.snapshots.read_all().await?;
        let mut fields = FieldErrors::new();

        if snapshot.version > SNAPSHOT_VERSION {
            fields.add(
                "version",
                format!(
                    "snapshot version {} is newer than supported version {}",
                    snapshot.version, SNAPSHOT_VERSION
                ),
            );
        }

        let data_sources = self.import_data_sources(&snapshot, &existing, &mut fields)?;
        let databases = self.import_databases(&snapshot, &existing, &mut fields)?;
        let llm_configs = self.import_llm_configs(&snapshot, &existing, &mut fields)?;
        let (simplified_llm_configs, llm_defaults) =
            self.import_simplified(&snapshot, &existing, &mut fields)?;

        let mut defaults = llm_defaults;
        if let Some(name) = snapshot
            .default_data_source
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
        {
            if data_sources.iter().any(|r| r.name == name && r.enabled) {
                defaults.insert(DATA_SOURCE_COLLECTION.to_string(), name.to_string());
            } else {
                fields.add(
                    "default_data_source",
                    format!("'{}' is not an enabled data source in this snapshot", name),
                );
            }
        }

        let mut settings = BTreeMap::new();
        for (key, value) in &snapshot.system_settings {
            if value.is_null() {
                continue;
            }
            match check_setting_type(key, value) {
                Ok(()) => {
                    settings.insert(key.clone(), value.clone());
                },
                Err(message) => fields.add(&format!("system_settings.{}", key), message),
            }
        }
        for (key, value) in &existing.settings {
            if is_sensitive_key(key) && !settings.contains_key(key) {
                settings.insert(key.clone(), value.clone());
            }
        }

        fields.into_result()?;

        let report = ImportReport {
            data_sources: data_sources.len(),
            databases: databases.len(),
            llm_configs: llm_configs.len(),
            simplified_llm_configs: simplified_llm_configs.len(),
            system_settings: snapshot.system_settings.len(),
        };

        self.repos
            .snapshots
            .replace_all(&StoreContents {
                data_sources,
                databases,
                llm_configs,
                simplified_llm_configs,
                defaults,
                settings,
            })
            .await?;
        self.cache.refresh().await;

        tracing::info!(?report, "Configuration imported");
        Ok(report)
    }

    /// Rebuilds the runtime snapshot from the store.
    pub async fn reload(&self) -> AppResult<ReloadResponse> {
        let snapshot = self.cache.reload().await?;

        tracing::info!("Runtime configuration reloaded on request");
        Ok(ReloadResponse {
            success: true,
            message: "Configuration reloaded".to_string(),
            reloaded_at: snapshot.loaded_at.clone().unwrap_or_else(now),
            data_sources: snapshot.data_sources.len(),
            llm_configs: snapshot.llm_candidates.len(),
        })
    }

    fn import_data_sources(
        &self,
        snapshot: &ConfigSnapshot,
        existing: &StoreContents,
        fields: &mut FieldErrors,
    ) -> AppResult<Vec<DataSourceRecord>> {
        let stored: HashMap<&str, &DataSourceRecord> = existing
            .data_sources
            .iter()
            .map(|r| (r.name.as_str(), r))
            .collect();
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for (i, draft) in snapshot.data_sources.iter().enumerate() {
            let prefix = format!("data_sources[{}]", i);
            let mut draft = draft.clone();
            draft.normalize();
            if !collect_errors(fields, &prefix, draft.validate()) {
                continue;
            }
            let Some(name) = draft.name.clone() else { continue };
            if !seen.insert(name.clone()) {
                fields.add(&format!("{}.name", prefix), format!("duplicate name '{}'", name));
                continue;
            }

            let previous = stored.get(name.as_str()).copied();
            let record = seal_data_source(&self.cipher, &draft, previous)?;
            records.push(record.settle(previous));
        }

        Ok(records)
    }

    fn import_databases(
        &self,
        snapshot: &ConfigSnapshot,
        existing: &StoreContents,
        fields: &mut FieldErrors,
    ) -> AppResult<Vec<DatabaseConfigRecord>> {
        let stored: HashMap<&str, &DatabaseConfigRecord> = existing
            .databases
            .iter()
            .map(|r| (r.name.as_str(), r))
            .collect();
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for (i, draft) in snapshot.databases.iter().enumerate() {
            let prefix = format!("databases[{}]", i);
            let mut draft = draft.clone();
            draft.normalize();
            if !collect_errors(fields, &prefix, draft.validate()) {
                continue;
            }
            let Some(name) = draft.name.clone() else { continue };
            if !seen.insert(name.clone()) {
                fields.add(&format!("{}.name", prefix), format!("duplicate name '{}'", name));
                continue;
            }

            let previous = stored.get(name.as_str()).copied();
            let record = seal_database_config(&self.cipher, &draft, previous)?;
            records.push(record.settle(previous));
        }

        Ok(records)
    }

    fn import_llm_configs(
        &self,
        snapshot: &ConfigSnapshot,
        existing: &StoreContents,
        fields: &mut FieldErrors,
    ) -> AppResult<Vec<LlmConfigRecord>> {
        let stored: HashMap<&str, &LlmConfigRecord> = existing
            .llm_configs
            .iter()
            .map(|r| (r.id.as_str(), r))
            .collect();
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for (i, request) in snapshot.llm_configs.iter().enumerate() {
            let prefix = format!("llm_configs[{}]", i);
            let mut request = request.clone();
            request.normalize();
            if !collect_errors(fields, &prefix, request.validate()) {
                continue;
            }
            let id = request
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            if !seen.insert(id.clone()) {
                fields.add(&format!("{}.id", prefix), format!("duplicate id '{}'", id));
                continue;
            }

            let previous = stored.get(id.as_str()).copied();
            let record = seal_llm_config(&self.cipher, &request, id, previous)?;
            records.push(record.settle(previous));
        }

        Ok(records)
    }

    /// Returns the records plus their `llm:<provider>` default pointers.
    fn import_simplified(
        &self,
        snapshot: &ConfigSnapshot,
        existing: &StoreContents,
        fields: &mut FieldErrors,
    ) -> AppResult<(Vec<SimplifiedLlmRecord>, BTreeMap<String, String>)> {
        let stored: HashMap<&str, &SimplifiedLlmRecord> = existing
            .simplified_llm_configs
            .iter()
            .map(|r| (r.id.as_str(), r))
            .collect();
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut defaults = BTreeMap::new();

        for (i, entry) in snapshot.simplified_llm_configs.iter().enumerate() {
            let prefix = format!("simplified_llm_configs[{}]", i);
            let mut request = entry.config.clone();
            request.normalize();
            if !collect_errors(fields, &prefix, request.validate()) {
                continue;
            }
            let id = entry
                .id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            if !seen.insert(id.clone()) {
                fields.add(&format!("{}.id", prefix), format!("duplicate id '{}'", id));
                continue;
            }

            let previous = stored.get(id.as_str()).copied();
            let record = seal_simplified_llm(&self.cipher, &request, id, previous)?.settle(previous);

            if entry.is_default {
                let collection = llm_collection(&record.provider);
                if !record.enabled {
                    fields.add(
                        &format!("{}.is_default", prefix),
                        "a disabled model cannot be the default",
                    );
                } else if defaults.contains_key(&collection) {
                    fields.add(
                        &format!("{}.is_default", prefix),
                        format!("provider '{}' already has a default", record.provider),
                    );
                } else {
                    defaults.insert(collection, record.id.clone());
                }
            }
            records.push(record);
        }

        Ok((records, defaults))
    }

    fn effective_settings(
        &self,
        stored: &BTreeMap<String, JsonValue>,
    ) -> BTreeMap<String, EffectiveSetting> {
        let mut effective = BTreeMap::new();

        for definition in setting_definitions() {
            let (value, source) = match self.env_value(definition.key, definition.kind) {
                Some(value) => (value, SettingSource::Environment),
                None => match stored.get(definition.key) {
                    Some(value) => (value.clone(), SettingSource::Database),
                    None => (definition.default.clone(), SettingSource::Default),
                },
            };
            effective.insert(
                definition.key.to_string(),
                EffectiveSetting {
                    value,
                    source,
                    description: Some(definition.description.to_string()),
                },
            );
        }

        for (key, value) in stored {
            if effective.contains_key(key) {
                continue;
            }
            let (value, source) = match self.env_value(key, SettingKind::Text) {
                Some(value) => (value, SettingSource::Environment),
                None => (value.clone(), SettingSource::Database),
            };
            effective.insert(
                key.clone(),
                EffectiveSetting {
                    value,
                    source,
                    description: None,
                },
            );
        }

        effective
    }

    fn env_value(&self, key: &str, kind: SettingKind) -> Option<JsonValue> {
        let var = env_var_for(key);
        let raw = (self.env)(&var).filter(|v| !v.trim().is_empty())?;
        let parsed = kind.parse_env(&raw);
        if parsed.is_none() {
            tracing::warn!(variable = %var, "Ignoring environment override that is not {}", kind.name());
        }
        parsed
    }
}

/// Unchanged rows keep the timestamp they already carry.
trait Settle: Clone + PartialEq {
    fn updated_at(&self) -> &str;
    fn set_updated_at(&mut self, value: String);

    fn settle(self, previous: Option<&Self>) -> Self {
        let Some(previous) = previous else {
            return self;
        };
        let mut candidate = self.clone();
        candidate.set_updated_at(previous.updated_at().to_string());
        if &candidate == previous {
            candidate
        } else {
            self
        }
    }
}

macro_rules! impl_settle {
    ($($record:ty),*) => {
        $(
            impl Settle for $record {
                fn updated_at(&self) -> &str {
                    &self.updated_at
                }

                fn set_updated_at(&mut self, value: String) {
                    self.updated_at = value;
                }
            }
        )*
    };
}

impl_settle!(
    DataSourceRecord,
    DatabaseConfigRecord,
    LlmConfigRecord,
    SimplifiedLlmRecord
);

/// Copies validation failures into `fields` under `prefix`. Returns whether
/// the entry was valid.
fn collect_errors(
    fields: &mut FieldErrors,
    prefix: &str,
    result: Result<(), ValidationErrors>,
) -> bool {
    match result {
        Ok(()) => true,
        Err(errors) => {
            for (field, messages) in FieldErrors::from(errors).0 {
                for message in messages {
                    fields.add(&format!("{}.{}", prefix, field), message);
                }
            }
            false
        },
    }
}

fn check_setting_type(key: &str, value: &JsonValue) -> Result<(), String> {
    match setting_definition(key) {
        Some(definition) if !value.is_null() && !definition.kind.accepts(value) => {
            Err(format!("{} must be {}", key, definition.kind.name()))
        },
        _ => Ok(()),
    }
}

fn masked_values(effective: &BTreeMap<String, EffectiveSetting>) -> BTreeMap<String, JsonValue> {
    effective
        .iter()
        .map(|(key, setting)| {
            let value = if is_sensitive_key(key) {
                mask_value(&setting.value)
            } else {
                setting.value.clone()
            };
            (key.clone(), value)
        })
        .collect()
}

fn mask_value(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Null => JsonValue::Null,
        JsonValue::String(s) => JsonValue::String(mask_secret(s)),
        _ => json!(MASKED),
    }
}

fn is_masked_echo(value: &JsonValue, current: Option<&JsonValue>) -> bool {
    match value {
        JsonValue::String(s) => s == MASKED || current.is_some_and(|c| c == value),
        _ => false,
    }
}
