//! Static provider defaults used to prefill a new LLM configuration form.
//! They are never persisted and carry no validation weight.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ProviderTemplate {
    pub name: String,
    pub display_name: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f64,
    pub max_tokens: i64,
    pub timeout: i64,
    /// Environment variable holding the provider key when nothing is stored.
    pub api_key_env: String,
    pub suggested_models: Vec<String>,
}

fn template(
    name: &str,
    display_name: &str,
    base_url: &str,
    api_key_env: &str,
    models: &[&str],
) -> ProviderTemplate {
    ProviderTemplate {
        name: name.to_string(),
        display_name: display_name.to_string(),
        model: models[0].to_string(),
        base_url: base_url.to_string(),
        temperature: 0.7,
        max_tokens: 4000,
        timeout: 180,
        api_key_env: api_key_env.to_string(),
        suggested_models: models.iter().map(|m| m.to_string()).collect(),
    }
}

static TEMPLATES: Lazy<BTreeMap<&'static str, ProviderTemplate>> = Lazy::new(|| {
    BTreeMap::from([
        (
            "deepseek",
            template(
                "deepseek",
                "DeepSeek",
                "https://api.deepseek.com",
                "DEEPSEEK_API_KEY",
                &["deepseek-chat", "deepseek-reasoner"],
            ),
        ),
        (
            "openai",
            template(
                "openai",
                "OpenAI",
                "https://api.openai.com/v1",
                "OPENAI_API_KEY",
                &["gpt-4o", "gpt-4o-mini"],
            ),
        ),
        (
            "google",
            template(
                "google",
                "Google Gemini",
                "https://generativelanguage.googleapis.com/v1beta",
                "GOOGLE_API_KEY",
                &["gemini-2.0-flash", "gemini-1.5-pro"],
            ),
        ),
        (
            "dashscope",
            template(
                "dashscope",
                "Alibaba DashScope",
                "https://dashscope.aliyuncs.com/compatible-mode/v1",
                "DASHSCOPE_API_KEY",
                &["qwen-plus", "qwen-max", "qwen-turbo"],
            ),
        ),
        (
            "anthropic",
            template(
                "anthropic",
                "Anthropic",
                "https://api.anthropic.com",
                "ANTHROPIC_API_KEY",
                &["claude-3-5-sonnet-20241022"],
            ),
        ),
    ])
});

pub fn provider_template(name: &str) -> Option<&'static ProviderTemplate> {
    TEMPLATES.get(name.to_lowercase().as_str())
}

pub fn provider_templates() -> Vec<ProviderTemplate> {
    TEMPLATES.values().cloned().collect()
}

/// Model used when a provider record has none of its own.
pub fn default_model_for(provider: &str) -> &'static str {
    match provider.to_lowercase().as_str() {
        "openai" => "gpt-4o",
        "deepseek" => "deepseek-chat",
        "google" | "gemini" => "gemini-2.0-flash",
        "dashscope" | "qwen" => "qwen-plus",
        "anthropic" => "claude-3-5-sonnet-20241022",
        "zhipu" => "glm-4",
        "openrouter" => "openai/gpt-4o",
        _ => "gpt-4o",
    }
}

/// Base URL used when a record leaves it empty.
pub fn default_base_url_for(provider: &str) -> Option<&'static str> {
    match provider.to_lowercase().as_str() {
        "gemini" => provider_template("google"),
        "qwen" => provider_template("dashscope"),
        other => provider_template(other),
    }
    .map(|t| t.base_url.as_str())
    .or(match provider.to_lowercase().as_str() {
        "zhipu" => Some("https://open.bigmodel.cn/api/paas/v4"),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        _ => None,
    })
}
