use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;

use crate::config::EnvLookup;
use crate::domain::models::{
    default_base_url_for, default_model_for, provider_templates, ActiveLlmConfig,
    DataSourceRecord, LlmConfigSource, MarketCategory,
};
use crate::error::AppResult;
use crate::repositories::{SnapshotRepository, StoreContents, DATA_SOURCE_COLLECTION};
use crate::utils::SecretCipher;

/// The configuration analysis code reads, frozen at the last reload.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSnapshot {
    /// Priority order, as stored.
    pub data_sources: Vec<DataSourceRecord>,
    pub default_data_source: Option<String>,
    /// Candidates in selection order, keys opened.
    pub llm_candidates: Vec<ActiveLlmConfig>,
    pub settings: BTreeMap<String, JsonValue>,
    pub loaded_at: Option<String>,
}

impl RuntimeSnapshot {
    /// Enabled sources in the order adapters should try them: the default
    /// first, then by priority. Sources with no market tags serve every market.
    pub fn resolve_data_sources(&self, market: Option<MarketCategory>) -> Vec<DataSourceRecord> {
        let mut resolved: Vec<DataSourceRecord> = self
            .data_sources
            .iter()
            .filter(|source| source.enabled)
            .filter(|source| match market {
                Some(market) => source.serves_market(market),
                None => true,
            })
            .cloned()
            .collect();

        if let Some(default) = &self.default_data_source {
            if let Some(pos) = resolved.iter().position(|s| &s.name == default) {
                let source = resolved.remove(pos);
                resolved.insert(0, source);
            }
        }

        resolved
    }

    /// First enabled candidate, optionally restricted to one provider.
    pub fn active_llm(&self, provider: Option<&str>) -> Option<&ActiveLlmConfig> {
        self.llm_candidates.iter().find(|candidate| match provider {
            Some(p) => candidate.provider.eq_ignore_ascii_case(p),
            None => true,
        })
    }
}

/// Holds the current [`RuntimeSnapshot`] behind an `Arc` so readers take a
/// cheap clone and never observe a half-built state.
pub struct RuntimeCache {
    snapshots: SnapshotRepository,
    cipher: SecretCipher,
    env: EnvLookup,
    state: RwLock<Arc<RuntimeSnapshot>>,
}

impl RuntimeCache {
    pub fn new(snapshots: SnapshotRepository, cipher: SecretCipher, env: EnvLookup) -> Self {
        Self {
            snapshots,
            cipher,
            env,
            state: RwLock::new(Arc::new(RuntimeSnapshot::default())),
        }
    }

    pub async fn current(&self) -> Arc<RuntimeSnapshot> {
        self.state.read().await.clone()
    }

    /// Rebuilds the snapshot from the store and swaps it in. The previous
    /// snapshot stays in place when the read fails.
    pub async fn reload(&self) -> AppResult<Arc<RuntimeSnapshot>> {
        let contents = self.snapshots.read_all().await?;
        let snapshot = Arc::new(self.build(contents));

        *self.state.write().await = snapshot.clone();

        tracing::debug!(
            data_sources = snapshot.data_sources.len(),
            llm_candidates = snapshot.llm_candidates.len(),
            "Runtime configuration reloaded"
        );
        Ok(snapshot)
    }

    /// Reload after a write; a failed refresh is logged, not returned,
    /// because the write itself already succeeded.
    pub async fn refresh(&self) {
        if let Err(e) = self.reload().await {
            tracing::warn!(error = %e, "Failed to refresh runtime configuration");
        }
    }

    fn build(&self, contents: StoreContents) -> RuntimeSnapshot {
        let mut llm_candidates: Vec<ActiveLlmConfig> = contents
            .llm_configs
            .iter()
            .filter(|record| record.enabled)
            .map(|record| {
                let api_key = match self.cipher.decrypt_opt(record.api_key_encrypted.as_deref()) {
                    Ok(key) => key,
                    Err(e) => {
                        tracing::warn!(id = %record.id, error = %e, "Stored LLM key cannot be opened");
                        None
                    },
                };
                let model = if record.model.trim().is_empty() {
                    default_model_for(&record.name).to_string()
                } else {
                    record.model.clone()
                };
                let base_url = record
                    .base_url
                    .clone()
                    .or_else(|| default_base_url_for(&record.name).map(str::to_string));

                ActiveLlmConfig {
                    provider: record.name.clone(),
                    model,
                    base_url,
                    temperature: record.temperature,
                    max_tokens: record.max_tokens,
                    timeout: record.timeout,
                    has_api_key: api_key.is_some(),
                    api_key,
                    source: LlmConfigSource::Store,
                }
            })
            .collect();

        if llm_candidates.is_empty() {
            llm_candidates = env_llm_candidates(&self.env);
        }

        RuntimeSnapshot {
            default_data_source: contents.defaults.get(DATA_SOURCE_COLLECTION).cloned(),
            data_sources: contents.data_sources,
            llm_candidates,
            settings: contents.settings,
            loaded_at: Some(Utc::now().to_rfc3339()),
        }
    }
}

/// Provider keys exported in the environment, in template order. Values
/// that still hold a `your_...` placeholder are ignored.
pub fn env_llm_candidates(env: &EnvLookup) -> Vec<ActiveLlmConfig> {
    provider_templates()
        .into_iter()
        .filter_map(|template| {
            let api_key = env(&template.api_key_env)
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty() && !k.starts_with("your_"))?;
            let prefix = template.name.to_uppercase();
            let base_url = env(&format!("{}_BASE_URL", prefix))
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(template.base_url);
            let model = env(&format!("{}_MODEL", prefix))
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(template.model);

            Some(ActiveLlmConfig {
                provider: template.name,
                model,
                base_url: Some(base_url),
                temperature: template.temperature,
                max_tokens: template.max_tokens,
                timeout: template.timeout,
                api_key: Some(api_key),
                has_api_key: true,
                source: LlmConfigSource::Environment,
            })
        })
        .collect()
}
