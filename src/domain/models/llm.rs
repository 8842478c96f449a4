use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::data_source::non_blank;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LlmConfigRecord {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub model: String,
    pub api_key_encrypted: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f64,
    pub max_tokens: i64,
    pub timeout: i64,
    pub enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl LlmConfigRecord {
    /// Export shape: everything but the key, identified by `id`.
    pub fn to_request(&self) -> SaveLlmConfigRequest {
        SaveLlmConfigRequest {
            id: Some(self.id.clone()),
            name: Some(self.name.clone()),
            display_name: Some(self.display_name.clone()),
            model: Some(self.model.clone()),
            api_key: None,
            base_url: self.base_url.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: self.timeout,
            enabled: self.enabled,
        }
    }
}

pub(crate) fn default_temperature() -> f64 {
    0.7
}

pub(crate) fn default_max_tokens() -> i64 {
    4000
}

pub(crate) fn default_timeout() -> i64 {
    180
}

fn default_true() -> bool {
    true
}

/// Create (no `id`) or update in place (`id` given). An omitted or blank
/// `api_key` on update keeps the stored key.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SaveLlmConfigRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[validate(
        required(message = "name is required"),
        length(min = 1, max = 64, message = "name must be 1-64 characters")
    )]
    #[schema(example = "deepseek")]
    pub name: Option<String>,
    #[validate(
        required(message = "display_name is required"),
        length(min = 1, max = 100, message = "display_name must be 1-100 characters")
    )]
    #[schema(example = "DeepSeek")]
    pub display_name: Option<String>,
    #[validate(
        required(message = "model is required"),
        length(min = 1, max = 128, message = "model must be 1-128 characters")
    )]
    #[schema(example = "deepseek-chat")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[validate(url(message = "base_url must be a valid URL"))]
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    #[validate(range(min = 0.0, max = 2.0, message = "temperature must be between 0 and 2"))]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    #[validate(range(min = 1, max = 128000, message = "max_tokens must be between 1 and 128000"))]
    pub max_tokens: i64,
    #[serde(default = "default_timeout")]
    #[validate(range(min = 10, max = 600, message = "timeout must be between 10 and 600 seconds"))]
    pub timeout: i64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for SaveLlmConfigRequest {
    fn default() -> Self {
        Self {
            id: None,
            name: None,
            display_name: None,
            model: None,
            api_key: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout: default_timeout(),
            enabled: true,
        }
    }
}

impl SaveLlmConfigRequest {
    pub fn normalize(&mut self) {
        self.id = non_blank(self.id.take());
        self.name = self.name.take().map(|n| n.trim().to_lowercase());
        self.display_name = self.display_name.take().map(|n| n.trim().to_string());
        self.model = self.model.take().map(|m| m.trim().to_string());
        self.api_key = non_blank(self.api_key.take());
        self.base_url = non_blank(self.base_url.take());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct LlmConfigResponse {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub model: String,
    /// Masked; the full key never leaves the service.
    pub api_key: Option<String>,
    pub has_api_key: bool,
    pub base_url: Option<String>,
    pub temperature: f64,
    pub max_tokens: i64,
    pub timeout: i64,
    pub enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LlmTestRequest {
    pub config_id: String,
}

/// Acknowledgement for operations with nothing else to return.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmConfigSource {
    Store,
    Environment,
}

/// The LLM configuration the analysis runtime would pick right now.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ActiveLlmConfig {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f64,
    pub max_tokens: i64,
    pub timeout: i64,
    pub api_key: Option<String>,
    pub has_api_key: bool,
    pub source: LlmConfigSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_numeric_fields() {
        let request: SaveLlmConfigRequest = serde_json::from_str(
            r#"{"name":"deepseek","display_name":"DeepSeek","model":"deepseek-chat"}"#,
        )
        .unwrap();
        assert_eq!(request.temperature, 0.7);
        assert_eq!(request.max_tokens, 4000);
        assert_eq!(request.timeout, 180);
        assert!(request.enabled);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn ranges_are_enforced() {
        let request = SaveLlmConfigRequest {
            name: Some("openai".into()),
            display_name: Some("OpenAI".into()),
            model: Some("gpt-4o".into()),
            temperature: 2.5,
            max_tokens: 0,
            timeout: 5,
            ..Default::default()
        };
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("temperature"));
        assert!(fields.contains_key("max_tokens"));
        assert!(fields.contains_key("timeout"));
    }

    #[test]
    fn required_identity_fields() {
        let errors = SaveLlmConfigRequest::default().validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("display_name"));
        assert!(fields.contains_key("model"));
    }
}
