use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};
use validator::Validate;

use crate::config::ProbeSettings;
use crate::domain::models::{
    default_base_url_for, default_model_for, ConfigKind, ConnectionTestRequest,
    ConnectionTestResult, DataSourceDraft, DatabaseConfigDraft, DatabaseKind, SaveLlmConfigRequest,
};
use crate::error::{AppError, AppResult};
use crate::infrastructure::{bounded, ProbeError, Prober};

const PREVIEW_CHARS: usize = 100;
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Where and how to reach an LLM provider for a one-shot probe.
#[derive(Debug, Clone)]
pub struct LlmProbeTarget {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f64,
}

#[derive(Debug, Clone)]
pub struct DatabaseProbeTarget {
    pub kind: DatabaseKind,
    pub host: String,
    pub port: i64,
    pub password: Option<String>,
}

/// Turns raw probe outcomes into `{success, message}` results. Nothing a
/// remote endpoint does is reported as an error.
pub struct ConnectionTestService {
    prober: Arc<dyn Prober>,
    probe: ProbeSettings,
}

impl ConnectionTestService {
    pub fn new(prober: Arc<dyn Prober>, probe: ProbeSettings) -> Self {
        Self { prober, probe }
    }

    pub fn timeout(&self, requested_secs: Option<u64>) -> Duration {
        self.probe.effective_timeout(requested_secs)
    }

    /// Probes an unsaved configuration. A payload that does not describe a
    /// config of the requested kind is a validation error; an unreachable
    /// target is a failed result.
    pub async fn test(&self, request: ConnectionTestRequest) -> AppResult<ConnectionTestResult> {
        match request.kind {
            ConfigKind::Datasource => {
                let mut draft: DataSourceDraft = parse_config(request.config)?;
                draft.normalize();
                draft.validate()?;
                let timeout = self.timeout(
                    request
                        .timeout_secs
                        .or(draft.timeout.map(|t| t.max(1) as u64)),
                );
                let endpoint = draft.endpoint.clone().or_else(|| {
                    draft
                        .source_type
                        .and_then(|t| t.default_endpoint())
                        .map(str::to_string)
                });
                Ok(self.probe_data_source(endpoint.as_deref(), timeout).await)
            },
            ConfigKind::Database => {
                let mut draft: DatabaseConfigDraft = parse_config(request.config)?;
                draft.normalize();
                draft.validate()?;
                let target = match (draft.kind, draft.host, draft.port) {
                    (Some(kind), Some(host), Some(port)) => DatabaseProbeTarget {
                        kind,
                        host,
                        port,
                        password: draft.password,
                    },
                    _ => {
                        return Err(AppError::Validation(
                            "type, host and port are required".to_string(),
                        ))
                    },
                };
                let timeout = self.timeout(request.timeout_secs);
                Ok(self.probe_database(&target, timeout).await)
            },
            ConfigKind::Llm => {
                let mut draft: SaveLlmConfigRequest = parse_config(request.config)?;
                draft.normalize();
                let provider = draft
                    .name
                    .clone()
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| AppError::Validation("name is required".to_string()))?;
                let model = draft
                    .model
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| default_model_for(&provider).to_string());
                let target = LlmProbeTarget {
                    provider,
                    model,
                    base_url: draft.base_url,
                    api_key: draft.api_key,
                    temperature: draft.temperature,
                };
                let timeout = self.timeout(request.timeout_secs);
                Ok(self.probe_llm(&target, timeout).await)
            },
        }
    }

    pub async fn probe_data_source(
        &self,
        endpoint: Option<&str>,
        timeout: Duration,
    ) -> ConnectionTestResult {
        let Some(endpoint) = endpoint else {
            return ConnectionTestResult::failure(
                "No network endpoint to test for this data source",
            );
        };

        match bounded(timeout, self.prober.http_get(endpoint, timeout)).await {
            Ok(status @ 200..=399) => {
                ConnectionTestResult::success(format!("Endpoint reachable (HTTP {})", status))
                    .with_details(json!({ "status": status, "endpoint": endpoint }))
            },
            Ok(status @ (401 | 403)) => ConnectionTestResult::failure(format!(
                "Endpoint rejected the credentials (HTTP {})",
                status
            ))
            .with_details(json!({ "status": status, "endpoint": endpoint })),
            Ok(status) => {
                ConnectionTestResult::failure(format!("Endpoint returned HTTP {}", status))
                    .with_details(json!({ "status": status, "endpoint": endpoint }))
            },
            Err(e) => ConnectionTestResult::failure(format!("Endpoint unreachable: {}", e))
                .with_details(json!({ "endpoint": endpoint })),
        }
    }

    pub async fn probe_database(
        &self,
        target: &DatabaseProbeTarget,
        timeout: Duration,
    ) -> ConnectionTestResult {
        let Ok(port) = u16::try_from(target.port) else {
            return ConnectionTestResult::failure(format!("Invalid port {}", target.port));
        };
        let details = json!({
            "type": target.kind.as_str(),
            "host": target.host,
            "port": port,
        });

        let outcome = match target.kind {
            DatabaseKind::Redis => {
                let ping = self.prober.redis_ping(
                    &target.host,
                    port,
                    target.password.clone(),
                    timeout,
                );
                match bounded(timeout, ping).await {
                    Ok(reply) if reply == "+PONG" => Ok(()),
                    Ok(reply) => Err(ProbeError::Protocol(reply)),
                    Err(e) => Err(e),
                }
            },
            _ => bounded(timeout, self.prober.tcp_connect(&target.host, port, timeout)).await,
        };

        match outcome {
            Ok(()) => ConnectionTestResult::success(format!(
                "Connected to {} at {}:{}",
                target.kind, target.host, port
            ))
            .with_details(details),
            Err(e) => ConnectionTestResult::failure(format!(
                "Could not reach {} at {}:{}: {}",
                target.kind, target.host, port, e
            ))
            .with_details(details),
        }
    }

    pub async fn probe_llm(&self, target: &LlmProbeTarget, timeout: Duration) -> ConnectionTestResult {
        let Some(api_key) = target.api_key.as_deref().filter(|k| !k.is_empty()) else {
            return ConnectionTestResult::failure(
                "No API key configured. Please add an API key first.",
            );
        };
        let Some(base_url) = target
            .base_url
            .clone()
            .or_else(|| default_base_url_for(&target.provider).map(str::to_string))
        else {
            return ConnectionTestResult::failure(format!(
                "No base URL configured for provider '{}'",
                target.provider
            ));
        };

        let request = chat_probe_request(target, &base_url, api_key);
        tracing::debug!(provider = %target.provider, model = %target.model, "Probing LLM provider");

        let reply = match bounded(
            timeout,
            self.prober
                .http_post_json(&request.url, request.headers, request.body, timeout),
        )
        .await
        {
            Ok(reply) => reply,
            Err(e) => return ConnectionTestResult::failure(format!("LLM request failed: {}", e)),
        };

        match reply.status {
            200..=299 => {
                let text = request.style.reply_text(&reply.body).unwrap_or_default();
                ConnectionTestResult::success("LLM connection successful")
                    .with_preview(text.chars().take(PREVIEW_CHARS).collect::<String>())
            },
            401 | 403 => ConnectionTestResult::failure(format!(
                "API key rejected by {} (HTTP {})",
                target.provider, reply.status
            )),
            status => ConnectionTestResult::failure(format!(
                "LLM provider returned HTTP {}: {}",
                status,
                error_message(&reply.body)
            )),
        }
    }
}

fn parse_config<T: DeserializeOwned>(config: JsonValue) -> AppResult<T> {
    serde_json::from_value(config)
        .map_err(|e| AppError::InvalidInput(format!("Invalid configuration: {}", e)))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ChatStyle {
    OpenAi,
    Gemini,
    Anthropic,
}

impl ChatStyle {
    fn for_provider(provider: &str) -> Self {
        match provider.to_lowercase().as_str() {
            "google" | "gemini" => Self::Gemini,
            "anthropic" | "claude" => Self::Anthropic,
            _ => Self::OpenAi,
        }
    }

    fn reply_text(&self, body: &JsonValue) -> Option<String> {
        let text = match self {
            Self::OpenAi => body.pointer("/choices/0/message/content"),
            Self::Gemini => body.pointer("/candidates/0/content/parts/0/text"),
            Self::Anthropic => body.pointer("/content/0/text"),
        };
        text.and_then(|t| t.as_str()).map(str::to_string)
    }
}

struct ChatProbeRequest {
    style: ChatStyle,
    url: String,
    headers: Vec<(String, String)>,
    body: JsonValue,
}

fn chat_probe_request(target: &LlmProbeTarget, base_url: &str, api_key: &str) -> ChatProbeRequest {
    let base = base_url.trim_end_matches('/');
    let style = ChatStyle::for_provider(&target.provider);

    match style {
        ChatStyle::Gemini => ChatProbeRequest {
            style,
            url: format!("{}/models/{}:generateContent", base, target.model),
            headers: vec![("x-goog-api-key".to_string(), api_key.to_string())],
            body: json!({
                "contents": [{ "parts": [{ "text": "Hi" }] }],
                "generationConfig": { "maxOutputTokens": 100, "temperature": target.temperature },
            }),
        },
        ChatStyle::Anthropic => {
            let url = if base.ends_with("/v1") {
                format!("{}/messages", base)
            } else {
                format!("{}/v1/messages", base)
            };
            ChatProbeRequest {
                style,
                url,
                headers: vec![
                    ("x-api-key".to_string(), api_key.to_string()),
                    ("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
                ],
                body: json!({
                    "model": target.model,
                    "max_tokens": 100,
                    "messages": [{ "role": "user", "content": "Hi" }],
                }),
            }
        },
        ChatStyle::OpenAi => ChatProbeRequest {
            style,
            url: format!("{}/chat/completions", base),
            headers: vec![("Authorization".to_string(), format!("Bearer {}", api_key))],
            body: json!({
                "model": target.model,
                "messages": [{ "role": "user", "content": "Hi" }],
                "max_tokens": 100,
                "temperature": target.temperature,
            }),
        },
    }
}

fn error_message(body: &JsonValue) -> String {
    body.pointer("/error/message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| match body {
            JsonValue::String(s) => s.chars().take(PREVIEW_CHARS).collect(),
            other => other.to_string().chars().take(PREVIEW_CHARS).collect(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{HttpReply, MockProber};

    fn service(prober: MockProber) -> ConnectionTestService {
        ConnectionTestService::new(Arc::new(prober), ProbeSettings::default())
    }

    fn target(provider: &str) -> LlmProbeTarget {
        LlmProbeTarget {
            provider: provider.to_string(),
            model: "test-model".to_string(),
            base_url: None,
            api_key: Some("sk-test-0123456789".to_string()),
            temperature: 0.7,
        }
    }

    #[tokio::test]
    async fn data_source_status_codes_map_to_results() {
        let mut prober = MockProber::new();
        prober
            .expect_http_get()
            .withf(|url, _| url == "https://ok.test")
            .returning(|_, _| Ok(302));
        prober
            .expect_http_get()
            .withf(|url, _| url == "https://denied.test")
            .returning(|_, _| Ok(401));
        prober
            .expect_http_get()
            .withf(|url, _| url == "https://down.test")
            .returning(|_, _| Err(ProbeError::Connect("refused".into())));
        let service = service(prober);
        let timeout = Duration::from_secs(1);

        assert!(service.probe_data_source(Some("https://ok.test"), timeout).await.success);

        let denied = service.probe_data_source(Some("https://denied.test"), timeout).await;
        assert!(!denied.success);
        assert!(denied.message.contains("credentials"));

        let down = service.probe_data_source(Some("https://down.test"), timeout).await;
        assert!(!down.success);
        assert!(down.message.contains("refused"));
    }

    #[tokio::test]
    async fn library_sources_have_nothing_to_probe() {
        let service = service(MockProber::new());
        let result = service
            .test(ConnectionTestRequest {
                kind: ConfigKind::Datasource,
                config: json!({ "name": "ak", "type": "akshare" }),
                timeout_secs: None,
            })
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.message.contains("No network endpoint"));
    }

    #[tokio::test]
    async fn redis_requires_pong() {
        let mut prober = MockProber::new();
        prober
            .expect_redis_ping()
            .returning(|_, _, _, _| Ok("-NOAUTH Authentication required.".to_string()));
        let result = service(prober)
            .probe_database(
                &DatabaseProbeTarget {
                    kind: DatabaseKind::Redis,
                    host: "cache".into(),
                    port: 6379,
                    password: None,
                },
                Duration::from_secs(1),
            )
            .await;
        assert!(!result.success);
        assert!(result.message.contains("NOAUTH"));
    }

    #[tokio::test]
    async fn database_probe_fills_default_port() {
        let mut prober = MockProber::new();
        prober
            .expect_tcp_connect()
            .withf(|host, port, _| host == "db.internal" && *port == 5432)
            .times(1)
            .returning(|_, _, _| Ok(()));
        let result = service(prober)
            .test(ConnectionTestRequest {
                kind: ConfigKind::Database,
                config: json!({ "name": "pg", "type": "postgresql", "host": "db.internal" }),
                timeout_secs: Some(3),
            })
            .await
            .unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn malformed_payload_is_an_error_not_a_result() {
        let service = service(MockProber::new());
        let result = service
            .test(ConnectionTestRequest {
                kind: ConfigKind::Database,
                config: json!({ "name": "x", "type": "oracle", "host": "h" }),
                timeout_secs: None,
            })
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn openai_compatible_probe_truncates_preview() {
        let mut prober = MockProber::new();
        prober
            .expect_http_post_json()
            .withf(|url, headers, body, _| {
                url == "https://api.deepseek.com/chat/completions"
                    && headers.iter().any(|(k, v)| k == "Authorization" && v.starts_with("Bearer "))
                    && body["max_tokens"] == 100
            })
            .returning(|_, _, _, _| {
                Ok(HttpReply {
                    status: 200,
                    body: json!({ "choices": [{ "message": { "content": "x".repeat(250) } }] }),
                })
            });
        let result = service(prober)
            .probe_llm(&target("deepseek"), Duration::from_secs(1))
            .await;
        assert!(result.success);
        assert_eq!(result.response_preview.unwrap().len(), 100);
    }

    #[tokio::test]
    async fn provider_errors_become_failed_results() {
        let mut prober = MockProber::new();
        prober.expect_http_post_json().returning(|_, _, _, _| {
            Ok(HttpReply {
                status: 429,
                body: json!({ "error": { "message": "quota exceeded" } }),
            })
        });
        let result = service(prober)
            .probe_llm(&target("openai"), Duration::from_secs(1))
            .await;
        assert!(!result.success);
        assert!(result.message.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn missing_key_never_calls_out() {
        let mut t = target("openai");
        t.api_key = None;
        let result = service(MockProber::new())
            .probe_llm(&t, Duration::from_secs(1))
            .await;
        assert!(!result.success);
    }

    #[test]
    fn anthropic_and_gemini_urls() {
        let anthropic = chat_probe_request(&target("anthropic"), "https://api.anthropic.com/", "k");
        assert_eq!(anthropic.url, "https://api.anthropic.com/v1/messages");
        let gemini = chat_probe_request(
            &target("google"),
            "https://generativelanguage.googleapis.com/v1beta",
            "k",
        );
        assert_eq!(
            gemini.url,
            "https://generativelanguage.googleapis.com/v1beta/models/test-model:generateContent"
        );
        assert_eq!(
            ChatStyle::Gemini.reply_text(&json!({
                "candidates": [{ "content": { "parts": [{ "text": "hello" }] } }]
            })),
            Some("hello".to_string())
        );
    }
}
