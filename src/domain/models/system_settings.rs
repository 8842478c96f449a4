use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SettingSource {
    Environment,
    Database,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Integer,
    Boolean,
    Text,
}

impl SettingKind {
    pub fn accepts(&self, value: &JsonValue) -> bool {
        match self {
            Self::Integer => value.as_i64().is_some(),
            Self::Boolean => value.is_boolean(),
            Self::Text => value.is_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Integer => "an integer",
            Self::Boolean => "a boolean",
            Self::Text => "a string",
        }
    }

    /// Parses a raw environment value into the registry type.
    pub fn parse_env(&self, raw: &str) -> Option<JsonValue> {
        match self {
            Self::Integer => raw.trim().parse::<i64>().ok().map(JsonValue::from),
            Self::Boolean => match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Some(JsonValue::Bool(true)),
                "0" | "false" | "no" | "off" => Some(JsonValue::Bool(false)),
                _ => None,
            },
            Self::Text => Some(JsonValue::String(raw.to_string())),
        }
    }
}

/// A setting the platform knows about. Unknown keys are stored as given.
#[derive(Debug, Clone)]
pub struct SettingDefinition {
    pub key: &'static str,
    pub kind: SettingKind,
    pub default: JsonValue,
    pub description: &'static str,
    pub sensitive: bool,
}

pub fn setting_definitions() -> Vec<SettingDefinition> {
    vec![
        SettingDefinition {
            key: "max_debate_rounds",
            kind: SettingKind::Integer,
            default: json!(1),
            description: "Rounds of bull/bear debate per analysis",
            sensitive: false,
        },
        SettingDefinition {
            key: "max_risk_discuss_rounds",
            kind: SettingKind::Integer,
            default: json!(1),
            description: "Rounds of risk discussion per analysis",
            sensitive: false,
        },
        SettingDefinition {
            key: "online_tools",
            kind: SettingKind::Boolean,
            default: json!(true),
            description: "Allow agents to call online data tools",
            sensitive: false,
        },
        SettingDefinition {
            key: "quick_analysis_model",
            kind: SettingKind::Text,
            default: json!("qwen-turbo"),
            description: "Model used for quick thinking steps",
            sensitive: false,
        },
        SettingDefinition {
            key: "deep_analysis_model",
            kind: SettingKind::Text,
            default: json!("qwen-max"),
            description: "Model used for deep thinking steps",
            sensitive: false,
        },
        SettingDefinition {
            key: "default_market",
            kind: SettingKind::Text,
            default: json!("a_shares"),
            description: "Market assumed when a request names none",
            sensitive: false,
        },
        SettingDefinition {
            key: "finnhub_api_key",
            kind: SettingKind::Text,
            default: JsonValue::Null,
            description: "Finnhub API key for US market news",
            sensitive: true,
        },
    ]
}

pub fn setting_definition(key: &str) -> Option<SettingDefinition> {
    setting_definitions().into_iter().find(|d| d.key == key)
}

/// Keys outside the registry are sensitive when their name says so.
pub fn is_sensitive_key(key: &str) -> bool {
    if let Some(def) = setting_definition(key) {
        return def.sensitive;
    }
    let lower = key.to_lowercase();
    ["api_key", "secret", "password", "token"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Environment variable that overrides a setting, e.g. `TA_MAX_DEBATE_ROUNDS`.
pub fn env_var_for(key: &str) -> String {
    format!("TA_{}", key.to_uppercase())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct SettingsPayload {
    #[schema(value_type = Object)]
    pub settings: BTreeMap<String, JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct SettingMeta {
    pub key: String,
    pub sensitive: bool,
    pub editable: bool,
    pub source: SettingSource,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SettingsMetaResponse {
    pub settings: Vec<SettingMeta>,
}
