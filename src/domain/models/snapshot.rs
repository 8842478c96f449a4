use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

use super::data_source::{DataSourceDraft, DataSourceResponse};
use super::database_config::{DatabaseConfigDraft, DatabaseConfigResponse};
use super::llm::{LlmConfigResponse, SaveLlmConfigRequest};
use super::simplified_llm::{SimplifiedLlmConfigRequest, SimplifiedLlmResponse};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything an operator sees on the settings page, secrets masked.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SystemConfigResponse {
    pub data_sources: Vec<DataSourceResponse>,
    pub default_data_source: Option<String>,
    pub databases: Vec<DatabaseConfigResponse>,
    pub llm_configs: Vec<LlmConfigResponse>,
    pub simplified_llm_configs: Vec<SimplifiedLlmResponse>,
    #[schema(value_type = Object)]
    pub system_settings: BTreeMap<String, JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SimplifiedLlmExport {
    pub id: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(flatten)]
    pub config: SimplifiedLlmConfigRequest,
}

/// Portable copy of the whole store. Secrets are never included on export;
/// on import a missing secret keeps whatever is stored under the same key.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfigSnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub exported_at: Option<String>,
    #[serde(default)]
    pub data_sources: Vec<DataSourceDraft>,
    #[serde(default)]
    pub default_data_source: Option<String>,
    #[serde(default)]
    pub databases: Vec<DatabaseConfigDraft>,
    #[serde(default)]
    pub llm_configs: Vec<SaveLlmConfigRequest>,
    #[serde(default)]
    pub simplified_llm_configs: Vec<SimplifiedLlmExport>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub system_settings: BTreeMap<String, JsonValue>,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ImportReport {
    pub data_sources: usize,
    pub databases: usize,
    pub llm_configs: usize,
    pub simplified_llm_configs: usize,
    pub system_settings: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReloadResponse {
    pub success: bool,
    pub message: String,
    pub reloaded_at: String,
    pub data_sources: usize,
    pub llm_configs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_snapshot_parses() {
        let snapshot: ConfigSnapshot = serde_json::from_str(r#"{"data_sources":[]}"#).unwrap();
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
        assert!(snapshot.databases.is_empty());
        assert!(snapshot.default_data_source.is_none());
    }

    #[test]
    fn simplified_export_is_flat() {
        let raw = r#"{"id":"a1","is_default":true,"provider":"openai","model_name":"gpt-4o"}"#;
        let entry: SimplifiedLlmExport = serde_json::from_str(raw).unwrap();
        assert!(entry.is_default);
        assert_eq!(entry.config.model_name.as_deref(), Some("gpt-4o"));
        assert_eq!(entry.config.max_tokens, 4000);
    }
}
