use std::collections::BTreeMap;

use uuid::Uuid;
use validator::Validate;

use super::reveal_masked;
use crate::domain::models::{
    LlmProvider, MigrationReport, SimplifiedLlmConfigRequest, SimplifiedLlmRecord,
    SimplifiedLlmResponse,
};
use crate::error::{AppError, AppResult};
use crate::repositories::{
    llm_collection, now, DefaultsRepository, LlmConfigRepository, SimplifiedLlmRepository,
};
use crate::utils::SecretCipher;

/// Model-level LLM entries grouped by provider, each group with at most one
/// default.
#[derive(Clone)]
pub struct SimplifiedLlmService {
    repo: SimplifiedLlmRepository,
    legacy: LlmConfigRepository,
    defaults: DefaultsRepository,
    cipher: SecretCipher,
}

impl SimplifiedLlmService {
    pub fn new(
        repo: SimplifiedLlmRepository,
        legacy: LlmConfigRepository,
        defaults: DefaultsRepository,
        cipher: SecretCipher,
    ) -> Self {
        Self {
            repo,
            legacy,
            defaults,
            cipher,
        }
    }

    pub async fn list(&self) -> AppResult<Vec<SimplifiedLlmResponse>> {
        let records = self.repo.list().await?;
        let defaults = self.defaults.llm_defaults().await?;

        Ok(records
            .iter()
            .map(|r| {
                let is_default = defaults.get(&r.provider) == Some(&r.id);
                simplified_llm_response(&self.cipher, r, is_default)
            })
            .collect())
    }

    pub async fn create(
        &self,
        mut request: SimplifiedLlmConfigRequest,
    ) -> AppResult<SimplifiedLlmResponse> {
        request.normalize();
        request.validate()?;

        let record = seal_simplified_llm(&self.cipher, &request, Uuid::new_v4().to_string(), None)?;
        self.repo.create(&record).await?;

        tracing::info!(id = %record.id, provider = %record.provider, model = %record.model_name, "LLM model config added");
        Ok(simplified_llm_response(&self.cipher, &record, false))
    }

    pub async fn update(
        &self,
        id: &str,
        mut request: SimplifiedLlmConfigRequest,
    ) -> AppResult<SimplifiedLlmResponse> {
        let existing = self.find(id).await?;

        request.normalize();
        request.validate()?;

        let record = seal_simplified_llm(&self.cipher, &request, id.to_string(), Some(&existing))?;
        self.repo.update(&record, &existing.provider).await?;

        let is_default = self.defaults.get(&llm_collection(&record.provider)).await?.as_deref()
            == Some(record.id.as_str());

        tracing::info!(id = %id, provider = %record.provider, "LLM model config updated");
        Ok(simplified_llm_response(&self.cipher, &record, is_default))
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        self.repo.delete(id).await?;
        tracing::info!(id = %id, "LLM model config deleted");
        Ok(())
    }

    /// Makes `id` the default of its provider group, replacing the previous
    /// default of that group only.
    pub async fn set_default(&self, id: &str) -> AppResult<()> {
        let provider = self.repo.set_default(id).await?.ok_or_else(|| {
            AppError::NotFound(format!("LLM model config '{}' not found or disabled", id))
        })?;

        tracing::info!(id = %id, provider = %provider, "Default LLM model changed");
        Ok(())
    }

    /// Converts every base LLM config into a model-level entry. The first
    /// enabled entry of each provider becomes that provider's default.
    pub async fn migrate_legacy(&self, force: bool) -> AppResult<MigrationReport> {
        let legacy = self.legacy.list().await?;
        let timestamp = now();
        let mut defaults: BTreeMap<LlmProvider, String> = BTreeMap::new();

        let records: Vec<SimplifiedLlmRecord> = legacy
            .iter()
            .map(|old| {
                let provider = LlmProvider::infer(&old.name);
                let record = SimplifiedLlmRecord {
                    id: Uuid::new_v4().to_string(),
                    provider: provider.as_str().to_string(),
                    provider_name: old.display_name.clone(),
                    model_name: old.model.clone(),
                    model_display_name: old.model.clone(),
                    api_key_encrypted: old.api_key_encrypted.clone(),
                    api_base: old.base_url.clone(),
                    temperature: old.temperature,
                    max_tokens: old.max_tokens,
                    timeout: old.timeout,
                    enabled: old.enabled,
                    capabilities: "[]".to_string(),
                    suitable_for: "[]".to_string(),
                    input_price: None,
                    output_price: None,
                    currency: "CNY".to_string(),
                    description: None,
                    created_at: timestamp.clone(),
                    updated_at: timestamp.clone(),
                };
                if record.enabled {
                    defaults.entry(provider).or_insert_with(|| record.id.clone());
                }
                record
            })
            .collect();

        let pairs: Vec<(String, String)> = defaults
            .iter()
            .map(|(provider, id)| (provider.as_str().to_string(), id.clone()))
            .collect();
        let replaced = self.repo.replace_all(&records, &pairs, force).await?;

        tracing::info!(
            migrated = records.len(),
            replaced,
            "Legacy LLM configs migrated"
        );
        Ok(MigrationReport {
            migrated: records.len(),
            replaced,
            defaults_assigned: defaults.into_keys().collect(),
        })
    }

    async fn find(&self, id: &str) -> AppResult<SimplifiedLlmRecord> {
        self.repo
            .find(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("LLM model config '{}' not found", id)))
    }
}

pub(crate) fn seal_simplified_llm(
    cipher: &SecretCipher,
    request: &SimplifiedLlmConfigRequest,
    id: String,
    existing: Option<&SimplifiedLlmRecord>,
) -> AppResult<SimplifiedLlmRecord> {
    let (Some(provider), Some(model_name)) = (request.provider, request.model_name.clone()) else {
        return Err(AppError::Validation(
            "provider and model_name are required".to_string(),
        ));
    };

    let api_key_encrypted = match &request.api_key {
        Some(key) => Some(cipher.encrypt(key)?),
        None => existing.and_then(|e| e.api_key_encrypted.clone()),
    };
    let timestamp = now();

    Ok(SimplifiedLlmRecord {
        id,
        provider: provider.as_str().to_string(),
        provider_name: request
            .provider_name
            .clone()
            .unwrap_or_else(|| provider.display_name().to_string()),
        model_display_name: request
            .model_display_name
            .clone()
            .unwrap_or_else(|| model_name.clone()),
        model_name,
        api_key_encrypted,
        api_base: request.api_base.clone(),
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        timeout: request.timeout,
        enabled: request.enabled,
        capabilities: serde_json::to_string(&request.capabilities)?,
        suitable_for: serde_json::to_string(&request.suitable_for)?,
        input_price: request.input_price,
        output_price: request.output_price,
        currency: request.currency.as_str().to_string(),
        description: request.description.clone(),
        created_at: existing
            .map(|e| e.created_at.clone())
            .unwrap_or_else(|| timestamp.clone()),
        updated_at: timestamp,
    })
}

pub(crate) fn simplified_llm_response(
    cipher: &SecretCipher,
    record: &SimplifiedLlmRecord,
    is_default: bool,
) -> SimplifiedLlmResponse {
    let api_key = reveal_masked(cipher, record.api_key_encrypted.as_deref());

    SimplifiedLlmResponse {
        id: record.id.clone(),
        provider: record.provider(),
        provider_name: record.provider_name.clone(),
        model_name: record.model_name.clone(),
        model_display_name: record.model_display_name.clone(),
        has_api_key: api_key.is_some(),
        api_key,
        api_base: record.api_base.clone(),
        temperature: record.temperature,
        max_tokens: record.max_tokens,
        timeout: record.timeout,
        enabled: record.enabled,
        is_default,
        capabilities: record.capabilities_list(),
        suitable_for: record.suitable_for_list(),
        input_price: record.input_price,
        output_price: record.output_price,
        currency: record.currency.parse().unwrap_or_default(),
        description: record.description.clone(),
        created_at: record.created_at.clone(),
        updated_at: record.updated_at.clone(),
    }
}
