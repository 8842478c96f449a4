use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use super::connection_test::{ConnectionTestService, LlmProbeTarget};
use super::reveal_masked;
use crate::domain::models::{
    provider_templates, ActiveLlmConfig, ConnectionTestResult, LlmConfigRecord, LlmConfigResponse,
    ProviderTemplate, SaveLlmConfigRequest,
};
use crate::error::{AppError, AppResult};
use crate::infrastructure::RuntimeCache;
use crate::repositories::{now, LlmConfigRepository};
use crate::utils::{mask_secret, SecretCipher};

#[derive(Clone)]
pub struct LlmConfigService {
    repo: LlmConfigRepository,
    cipher: SecretCipher,
    cache: Arc<RuntimeCache>,
    tests: Arc<ConnectionTestService>,
}

impl LlmConfigService {
    pub fn new(
        repo: LlmConfigRepository,
        cipher: SecretCipher,
        cache: Arc<RuntimeCache>,
        tests: Arc<ConnectionTestService>,
    ) -> Self {
        Self {
            repo,
            cipher,
            cache,
            tests,
        }
    }

    pub async fn list(&self) -> AppResult<Vec<LlmConfigResponse>> {
        let records = self.repo.list().await?;
        Ok(records
            .iter()
            .map(|r| llm_config_response(&self.cipher, r))
            .collect())
    }

    /// Creates when `id` is absent, otherwise replaces the stored record in
    /// place. The stored key survives an update that omits `api_key`.
    pub async fn save(&self, mut request: SaveLlmConfigRequest) -> AppResult<LlmConfigResponse> {
        request.normalize();
        request.validate()?;

        let record = match request.id.clone() {
            None => {
                let record = seal_llm_config(&self.cipher, &request, Uuid::new_v4().to_string(), None)?;
                self.repo.create(&record).await?;
                tracing::info!(id = %record.id, provider = %record.name, "LLM config created");
                record
            },
            Some(id) => {
                let existing = self
                    .repo
                    .find(&id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("LLM config '{}' not found", id)))?;
                let record = seal_llm_config(&self.cipher, &request, id, Some(&existing))?;
                self.repo.update(&record).await?;
                tracing::info!(id = %record.id, provider = %record.name, "LLM config updated");
                record
            },
        };

        self.cache.refresh().await;
        Ok(llm_config_response(&self.cipher, &record))
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        self.repo.delete(id).await?;
        self.cache.refresh().await;
        tracing::info!(id = %id, "LLM config deleted");
        Ok(())
    }

    /// Sends a one-line prompt with the stored key. Unknown or disabled ids
    /// fail before any request leaves the process.
    pub async fn test(&self, id: &str) -> AppResult<ConnectionTestResult> {
        let record = self
            .repo
            .find(id)
            .await?
            .filter(|r| r.enabled)
            .ok_or_else(|| AppError::NotFound(format!("LLM config '{}' not found or disabled", id)))?;

        let api_key = self
            .cipher
            .decrypt_opt(record.api_key_encrypted.as_deref())?;
        let target = LlmProbeTarget {
            provider: record.name.clone(),
            model: record.model.clone(),
            base_url: record.base_url.clone(),
            api_key,
            temperature: record.temperature,
        };

        let result = self.tests.probe_llm(&target, self.tests.timeout(None)).await;
        if result.success {
            tracing::info!(id = %id, provider = %record.name, "LLM config test succeeded");
        } else {
            tracing::warn!(id = %id, provider = %record.name, message = %result.message, "LLM config test failed");
        }
        Ok(result)
    }

    /// The configuration analysis would use now, key masked.
    pub async fn active(&self, provider: Option<&str>) -> AppResult<ActiveLlmConfig> {
        let snapshot = self.cache.current().await;
        let mut active = snapshot.active_llm(provider).cloned().ok_or_else(|| {
            AppError::NotFound(match provider {
                Some(p) => format!("No enabled LLM config for provider '{}'", p),
                None => "No enabled LLM config".to_string(),
            })
        })?;

        active.api_key = active.api_key.as_deref().map(mask_secret);
        Ok(active)
    }

    pub fn templates(&self) -> Vec<ProviderTemplate> {
        provider_templates()
    }
}

pub(crate) fn seal_llm_config(
    cipher: &SecretCipher,
    request: &SaveLlmConfigRequest,
    id: String,
    existing: Option<&LlmConfigRecord>,
) -> AppResult<LlmConfigRecord> {
    let (Some(name), Some(display_name), Some(model)) = (
        request.name.clone(),
        request.display_name.clone(),
        request.model.clone(),
    ) else {
        return Err(AppError::Validation(
            "name, display_name and model are required".to_string(),
        ));
    };

    let api_key_encrypted = match &request.api_key {
        Some(key) => Some(cipher.encrypt(key)?),
        None => existing.and_then(|e| e.api_key_encrypted.clone()),
    };
    let timestamp = now();

    Ok(LlmConfigRecord {
        id,
        name,
        display_name,
        model,
        api_key_encrypted,
        base_url: request.base_url.clone(),
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        timeout: request.timeout,
        enabled: request.enabled,
        created_at: existing
            .map(|e| e.created_at.clone())
            .unwrap_or_else(|| timestamp.clone()),
        updated_at: timestamp,
    })
}

pub(crate) fn llm_config_response(
    cipher: &SecretCipher,
    record: &LlmConfigRecord,
) -> LlmConfigResponse {
    let api_key = reveal_masked(cipher, record.api_key_encrypted.as_deref());

    LlmConfigResponse {
        id: record.id.clone(),
        name: record.name.clone(),
        display_name: record.display_name.clone(),
        model: record.model.clone(),
        has_api_key: api_key.is_some(),
        api_key,
        base_url: record.base_url.clone(),
        temperature: record.temperature,
        max_tokens: record.max_tokens,
        timeout: record.timeout,
        enabled: record.enabled,
        created_at: record.created_at.clone(),
        updated_at: record.updated_at.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::infrastructure::{HttpReply, MockProber};
    use crate::test_support::TestContext;

    fn deepseek() -> SaveLlmConfigRequest {
        SaveLlmConfigRequest {
            name: Some("DeepSeek".into()),
            display_name: Some("DeepSeek".into()),
            model: Some("deepseek-chat".into()),
            api_key: Some("sk-deepseek-abcdef0123".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_generates_id_and_masks_key() {
        let ctx = TestContext::new().await;
        let service = ctx.llm();
        let saved = service.save(deepseek()).await.unwrap();

        assert!(Uuid::parse_str(&saved.id).is_ok());
        assert_eq!(saved.name, "deepseek");
        assert_eq!(saved.api_key.as_deref(), Some("sk-d...0123"));

        let listed = service.list().await.unwrap();
        assert_eq!(listed, vec![saved]);
    }

    #[tokio::test]
    async fn update_without_key_keeps_the_stored_key() {
        let ctx = TestContext::new().await;
        let service = ctx.llm();
        let saved = service.save(deepseek()).await.unwrap();

        let mut update = deepseek();
        update.id = Some(saved.id.clone());
        update.api_key = None;
        update.model = Some("deepseek-reasoner".into());
        let updated = service.save(update).await.unwrap();

        assert_eq!(updated.id, saved.id);
        assert_eq!(updated.model, "deepseek-reasoner");
        assert!(updated.has_api_key);
        assert_eq!(updated.api_key, saved.api_key);
        assert_eq!(updated.created_at, saved.created_at);
    }

    #[tokio::test]
    async fn unknown_id_on_update_is_not_found() {
        let ctx = TestContext::new().await;
        let mut update = deepseek();
        update.id = Some("missing".into());
        assert!(matches!(ctx.llm().save(update).await, Err(AppError::NotFound(_))));
        assert!(matches!(ctx.llm().delete("missing").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn testing_disabled_or_missing_configs_never_calls_out() {
        let mut prober = MockProber::new();
        prober.expect_http_post_json().never();
        let ctx = TestContext::with_prober(prober).await;
        let service = ctx.llm();

        let mut disabled = deepseek();
        disabled.enabled = false;
        let saved = service.save(disabled).await.unwrap();

        assert!(matches!(service.test(&saved.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(service.test("nope").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_uses_the_stored_key() {
        let mut prober = MockProber::new();
        prober
            .expect_http_post_json()
            .withf(|_, headers, _, _| {
                headers
                    .iter()
                    .any(|(k, v)| k == "Authorization" && v == "Bearer sk-deepseek-abcdef0123")
            })
            .times(1)
            .returning(|_, _, _, _| {
                Ok(HttpReply {
                    status: 200,
                    body: json!({ "choices": [{ "message": { "content": "Hello!" } }] }),
                })
            });
        let ctx = TestContext::with_prober(prober).await;
        let service = ctx.llm();
        let saved = service.save(deepseek()).await.unwrap();

        let result = service.test(&saved.id).await.unwrap();
        assert!(result.success);
        assert_eq!(result.response_preview.as_deref(), Some("Hello!"));
    }

    #[tokio::test]
    async fn active_config_is_masked() {
        let ctx = TestContext::new().await;
        let service = ctx.llm();
        assert!(matches!(service.active(None).await, Err(AppError::NotFound(_))));

        service.save(deepseek()).await.unwrap();
        let active = service.active(None).await.unwrap();
        assert_eq!(active.provider, "deepseek");
        assert_eq!(active.api_key.as_deref(), Some("sk-d...0123"));
        assert!(active.has_api_key);
    }
}
