use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::data_source::non_blank;
use super::llm::{default_max_tokens, default_temperature, default_timeout};

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Deepseek,
    Openai,
    Google,
    Dashscope,
    Anthropic,
    Zhipu,
    Openrouter,
    Custom,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deepseek => "deepseek",
            Self::Openai => "openai",
            Self::Google => "google",
            Self::Dashscope => "dashscope",
            Self::Anthropic => "anthropic",
            Self::Zhipu => "zhipu",
            Self::Openrouter => "openrouter",
            Self::Custom => "custom",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Deepseek => "DeepSeek",
            Self::Openai => "OpenAI",
            Self::Google => "Google Gemini",
            Self::Dashscope => "Alibaba DashScope",
            Self::Anthropic => "Anthropic",
            Self::Zhipu => "Zhipu AI",
            Self::Openrouter => "OpenRouter",
            Self::Custom => "Custom",
        }
    }

    /// Maps a free-form provider key (as stored on base LLM configs) onto
    /// a known vendor; anything unrecognised becomes `Custom`.
    pub fn infer(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "deepseek" => Self::Deepseek,
            "openai" => Self::Openai,
            "google" | "gemini" => Self::Google,
            "dashscope" | "qwen" | "alibaba" => Self::Dashscope,
            "anthropic" | "claude" => Self::Anthropic,
            "zhipu" | "glm" => Self::Zhipu,
            "openrouter" => Self::Openrouter,
            _ => Self::Custom,
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deepseek" => Ok(Self::Deepseek),
            "openai" => Ok(Self::Openai),
            "google" => Ok(Self::Google),
            "dashscope" => Ok(Self::Dashscope),
            "anthropic" => Ok(Self::Anthropic),
            "zhipu" => Ok(Self::Zhipu),
            "openrouter" => Ok(Self::Openrouter),
            "custom" => Ok(Self::Custom),
            _ => Err(format!("Unknown LLM provider: {}", s)),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum ModelCapability {
    Vision,
    FunctionCalling,
    LongContext,
    Reasoning,
    FastResponse,
    CostEffective,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Cny,
    Usd,
    Eur,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cny => "CNY",
            Self::Usd => "USD",
            Self::Eur => "EUR",
        }
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CNY" => Ok(Self::Cny),
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            _ => Err(format!("Unknown currency: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SimplifiedLlmRecord {
    pub id: String,
    pub provider: String,
    pub provider_name: String,
    pub model_name: String,
    pub model_display_name: String,
    pub api_key_encrypted: Option<String>,
    pub api_base: Option<String>,
    pub temperature: f64,
    pub max_tokens: i64,
    pub timeout: i64,
    pub enabled: bool,
    pub capabilities: String,
    pub suitable_for: String,
    pub input_price: Option<f64>,
    pub output_price: Option<f64>,
    pub currency: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl SimplifiedLlmRecord {
    pub fn provider(&self) -> LlmProvider {
        self.provider.parse().unwrap_or(LlmProvider::Custom)
    }

    pub fn capabilities_list(&self) -> Vec<ModelCapability> {
        serde_json::from_str(&self.capabilities).unwrap_or_default()
    }

    pub fn suitable_for_list(&self) -> Vec<String> {
        serde_json::from_str(&self.suitable_for).unwrap_or_default()
    }

    pub fn to_request(&self) -> SimplifiedLlmConfigRequest {
        SimplifiedLlmConfigRequest {
            provider: Some(self.provider()),
            provider_name: Some(self.provider_name.clone()),
            model_name: Some(self.model_name.clone()),
            model_display_name: Some(self.model_display_name.clone()),
            api_key: None,
            api_base: self.api_base.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: self.timeout,
            enabled: self.enabled,
            capabilities: self.capabilities_list(),
            suitable_for: self.suitable_for_list(),
            input_price: self.input_price,
            output_price: self.output_price,
            currency: self.currency.parse().unwrap_or_default(),
            description: self.description.clone(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SimplifiedLlmConfigRequest {
    #[validate(required(message = "provider is required"))]
    pub provider: Option<LlmProvider>,
    pub provider_name: Option<String>,
    #[validate(
        required(message = "model_name is required"),
        length(min = 1, max = 128, message = "model_name must be 1-128 characters")
    )]
    pub model_name: Option<String>,
    pub model_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[validate(url(message = "api_base must be a valid URL"))]
    pub api_base: Option<String>,
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
    #[serde(default)]
    pub capabilities: Vec<ModelCapability>,
    #[serde(default)]
    pub suitable_for: Vec<String>,
    #[validate(range(min = 0.0, message = "input_price cannot be negative"))]
    pub input_price: Option<f64>,
    #[validate(range(min = 0.0, message = "output_price cannot be negative"))]
    pub output_price: Option<f64>,
    #[serde(default)]
    pub currency: Currency,
    pub description: Option<String>,
}

impl Default for SimplifiedLlmConfigRequest {
    fn default() -> Self {
        Self {
            provider: None,
            provider_name: None,
            model_name: None,
            model_display_name: None,
            api_key: None,
            api_base: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout: default_timeout(),
            enabled: true,
            capabilities: Vec::new(),
            suitable_for: Vec::new(),
            input_price: None,
            output_price: None,
            currency: Currency::default(),
            description: None,
        }
    }
}

impl SimplifiedLlmConfigRequest {
    /// Trims text and fills display names from the provider and model.
    pub fn normalize(&mut self) {
        self.model_name = self.model_name.take().map(|m| m.trim().to_string());
        self.provider_name = non_blank(self.provider_name.take())
            .or_else(|| self.provider.map(|p| p.display_name().to_string()));
        self.model_display_name =
            non_blank(self.model_display_name.take()).or_else(|| self.model_name.clone());
        self.api_key = non_blank(self.api_key.take());
        self.api_base = non_blank(self.api_base.take());
        self.description = non_blank(self.description.take());
        self.capabilities.sort();
        self.capabilities.dedup();
        self.suitable_for = self
            .suitable_for
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        self.suitable_for.sort();
        self.suitable_for.dedup();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct SimplifiedLlmResponse {
    pub id: String,
    pub provider: LlmProvider,
    pub provider_name: String,
    pub model_name: String,
    pub model_display_name: String,
    pub api_key: Option<String>,
    pub has_api_key: bool,
    pub api_base: Option<String>,
    pub temperature: f64,
    pub max_tokens: i64,
    pub timeout: i64,
    pub enabled: bool,
    pub is_default: bool,
    pub capabilities: Vec<ModelCapability>,
    pub suitable_for: Vec<String>,
    pub input_price: Option<f64>,
    pub output_price: Option<f64>,
    pub currency: Currency,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct MigrateLegacyRequest {
    /// Replace simplified configs that already exist.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct MigrationReport {
    pub migrated: usize,
    pub replaced: usize,
    /// Providers that received a default during the migration.
    pub defaults_assigned: Vec<LlmProvider>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_vendor_aliases() {
        assert_eq!(LlmProvider::infer("Gemini"), LlmProvider::Google);
        assert_eq!(LlmProvider::infer("qwen"), LlmProvider::Dashscope);
        assert_eq!(LlmProvider::infer("302ai"), LlmProvider::Custom);
    }

    #[test]
    fn display_names_are_filled_in() {
        let mut request = SimplifiedLlmConfigRequest {
            provider: Some(LlmProvider::Deepseek),
            model_name: Some(" deepseek-chat ".into()),
            ..Default::default()
        };
        request.normalize();
        assert_eq!(request.provider_name.as_deref(), Some("DeepSeek"));
        assert_eq!(request.model_display_name.as_deref(), Some("deepseek-chat"));
    }

    #[test]
    fn negative_prices_fail() {
        let request = SimplifiedLlmConfigRequest {
            provider: Some(LlmProvider::Openai),
            model_name: Some("gpt-4o".into()),
            input_price: Some(-0.1),
            ..Default::default()
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("input_price"));
    }

    #[test]
    fn currency_is_uppercase_on_the_wire() {
        assert_eq!(serde_json::to_string(&Currency::Usd).unwrap(), "\"USD\"");
        let parsed: Currency = serde_json::from_str("\"EUR\"").unwrap();
        assert_eq!(parsed, Currency::Eur);
    }
}
