use std::sync::Arc;

use validator::Validate;

use super::reveal_masked;
use crate::domain::models::{
    DataSourceCreated, DataSourceDraft, DataSourcePatch, DataSourceRecord, DataSourceResponse,
    MarketCategory,
};
use crate::error::{AppError, AppResult};
use crate::infrastructure::RuntimeCache;
use crate::repositories::{now, DataSourceRepository, DefaultsRepository, DATA_SOURCE_COLLECTION};
use crate::utils::SecretCipher;

#[derive(Clone)]
pub struct DataSourceService {
    repo: DataSourceRepository,
    defaults: DefaultsRepository,
    cipher: SecretCipher,
    cache: Arc<RuntimeCache>,
}

impl DataSourceService {
    pub fn new(
        repo: DataSourceRepository,
        defaults: DefaultsRepository,
        cipher: SecretCipher,
        cache: Arc<RuntimeCache>,
    ) -> Self {
        Self {
            repo,
            defaults,
            cipher,
            cache,
        }
    }

    pub async fn list(&self) -> AppResult<Vec<DataSourceResponse>> {
        let records = self.repo.list().await?;
        let default = self.defaults.get(DATA_SOURCE_COLLECTION).await?;

        Ok(records
            .iter()
            .map(|r| {
                let is_default = default.as_deref() == Some(r.name.as_str());
                data_source_response(&self.cipher, r, is_default)
            })
            .collect())
    }

    pub async fn add(&self, mut draft: DataSourceDraft) -> AppResult<DataSourceCreated> {
        draft.normalize();
        draft.validate()?;

        let record = seal_data_source(&self.cipher, &draft, None)?;
        if self.repo.find(&record.name).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Data source '{}' already exists",
                record.name
            )));
        }
        self.repo.create(&record).await?;
        self.cache.refresh().await;

        tracing::info!(name = %record.name, source_type = %record.source_type, "Data source added");
        Ok(DataSourceCreated { name: record.name })
    }

    pub async fn update(&self, name: &str, patch: DataSourcePatch) -> AppResult<DataSourceResponse> {
        let existing = self
            .repo
            .find(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Data source '{}' not found", name)))?;

        let mut draft = existing.to_draft();
        draft.apply(patch);
        draft.normalize();
        draft.validate()?;

        let record = seal_data_source(&self.cipher, &draft, Some(&existing))?;
        self.repo.update(&record).await?;
        self.cache.refresh().await;

        let default = self.defaults.get(DATA_SOURCE_COLLECTION).await?;
        tracing::info!(name = %name, "Data source updated");
        Ok(data_source_response(
            &self.cipher,
            &record,
            default.as_deref() == Some(name),
        ))
    }

    pub async fn delete(&self, name: &str) -> AppResult<()> {
        let was_default = self.repo.delete(name).await?;
        self.cache.refresh().await;

        if was_default {
            tracing::info!(name = %name, "Default data source deleted; no default is set now");
        } else {
            tracing::info!(name = %name, "Data source deleted");
        }
        Ok(())
    }

    pub async fn set_default(&self, name: &str) -> AppResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("name is required".to_string()));
        }
        if !self.repo.set_default(name).await? {
            return Err(AppError::NotFound(format!(
                "Data source '{}' not found or disabled",
                name
            )));
        }
        self.cache.refresh().await;

        tracing::info!(name = %name, "Default data source changed");
        Ok(())
    }

    /// Fallback order adapters consult, read from the runtime snapshot.
    pub async fn resolve(&self, market: Option<MarketCategory>) -> Vec<DataSourceResponse> {
        let snapshot = self.cache.current().await;
        let default = snapshot.default_data_source.as_deref();

        snapshot
            .resolve_data_sources(market)
            .iter()
            .map(|r| data_source_response(&self.cipher, r, default == Some(r.name.as_str())))
            .collect()
    }
}

/// Builds the row for a validated draft. Secrets the draft leaves out are
/// carried over from `existing`.
pub(crate) fn seal_data_source(
    cipher: &SecretCipher,
    draft: &DataSourceDraft,
    existing: Option<&DataSourceRecord>,
) -> AppResult<DataSourceRecord> {
    let name = draft
        .name
        .clone()
        .ok_or_else(|| AppError::Validation("name is required".to_string()))?;
    let source_type = draft
        .source_type
        .ok_or_else(|| AppError::Validation("type is required".to_string()))?;

    let api_key_encrypted = match &draft.api_key {
        Some(key) => Some(cipher.encrypt(key)?),
        None => existing.and_then(|e| e.api_key_encrypted.clone()),
    };
    let api_secret_encrypted = match &draft.api_secret {
        Some(secret) => Some(cipher.encrypt(secret)?),
        None => existing.and_then(|e| e.api_secret_encrypted.clone()),
    };
    let timestamp = now();

    Ok(DataSourceRecord {
        name,
        source_type: source_type.as_str().to_string(),
        api_key_encrypted,
        api_secret_encrypted,
        endpoint: draft.endpoint.clone(),
        timeout: draft.timeout,
        rate_limit: draft.rate_limit,
        enabled: draft.enabled,
        priority: draft.priority,
        config_params: serde_json::to_string(&draft.config_params)?,
        market_categories: serde_json::to_string(&draft.market_categories)?,
        description: draft.description.clone(),
        created_at: existing
            .map(|e| e.created_at.clone())
            .unwrap_or_else(|| timestamp.clone()),
        updated_at: timestamp,
    })
}

pub(crate) fn data_source_response(
    cipher: &SecretCipher,
    record: &DataSourceRecord,
    is_default: bool,
) -> DataSourceResponse {
    let api_key = reveal_masked(cipher, record.api_key_encrypted.as_deref());
    let api_secret = reveal_masked(cipher, record.api_secret_encrypted.as_deref());

    DataSourceResponse {
        name: record.name.clone(),
        source_type: record.source_type.clone(),
        has_api_key: api_key.is_some(),
        has_api_secret: api_secret.is_some(),
        api_key,
        api_secret,
        endpoint: record.endpoint.clone(),
        timeout: record.timeout,
        rate_limit: record.rate_limit,
        enabled: record.enabled,
        priority: record.priority,
        config_params: record.config_params_json(),
        market_categories: record.market_categories_list(),
        description: record.description.clone(),
        is_default,
        created_at: record.created_at.clone(),
        updated_at: record.updated_at.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::DataSourceType;
    use crate::test_support::TestContext;

    fn tushare() -> DataSourceDraft {
        DataSourceDraft {
            name: Some("tushare".into()),
            source_type: Some(DataSourceType::Tushare),
            api_key: Some("ts-token-abcdef123456".into()),
            timeout: Some(30),
            rate_limit: Some(100),
            priority: 0,
            enabled: true,
            ..Default::default()
        }
    }

    fn named(name: &str, priority: i64) -> DataSourceDraft {
        DataSourceDraft {
            name: Some(name.into()),
            source_type: Some(DataSourceType::Akshare),
            priority,
            enabled: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn added_source_is_listed_first_at_lowest_priority() {
        let ctx = TestContext::new().await;
        let service = ctx.data_sources();
        service.add(named("akshare", 5)).await.unwrap();

        let created = service.add(tushare()).await.unwrap();
        assert_eq!(created.name, "tushare");

        let list = service.list().await.unwrap();
        assert_eq!(list[0].name, "tushare");
        assert_eq!(list[0].api_key.as_deref(), Some("ts-t...3456"));
        assert!(list[0].has_api_key);
        assert!(!list[0].is_default);
    }

    #[tokio::test]
    async fn missing_name_cites_name() {
        let ctx = TestContext::new().await;
        let draft = DataSourceDraft {
            source_type: Some(DataSourceType::Akshare),
            ..Default::default()
        };
        match ctx.data_sources().add(draft).await {
            Err(AppError::InvalidFields(fields)) => assert!(fields.contains("name")),
            other => panic!("expected field errors, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn duplicate_name_conflicts_and_keeps_original() {
        let ctx = TestContext::new().await;
        let service = ctx.data_sources();
        service.add(tushare()).await.unwrap();

        let mut again = tushare();
        again.priority = 9;
        assert!(matches!(service.add(again).await, Err(AppError::Conflict(_))));

        let list = service.list().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].priority, 0);
    }

    #[tokio::test]
    async fn update_merges_and_revalidates() {
        let ctx = TestContext::new().await;
        let service = ctx.data_sources();
        service.add(tushare()).await.unwrap();

        let updated = service
            .update(
                "tushare",
                DataSourcePatch {
                    priority: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.priority, 2);
        assert_eq!(updated.timeout, Some(30));
        assert!(updated.has_api_key);

        let invalid = service
            .update(
                "tushare",
                DataSourcePatch {
                    rate_limit: Some(0),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(invalid, Err(AppError::InvalidFields(_))));
        assert_eq!(service.list().await.unwrap()[0].rate_limit, Some(100));

        let missing = service.update("nope", DataSourcePatch::default()).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn exactly_one_default_after_switching() {
        let ctx = TestContext::new().await;
        let service = ctx.data_sources();
        service.add(named("a", 0)).await.unwrap();
        service.add(named("b", 1)).await.unwrap();

        service.set_default("a").await.unwrap();
        service.set_default("b").await.unwrap();

        let list = service.list().await.unwrap();
        let defaults: Vec<_> = list.iter().filter(|s| s.is_default).map(|s| s.name.as_str()).collect();
        assert_eq!(defaults, vec!["b"]);
    }

    #[tokio::test]
    async fn deleting_the_default_leaves_none() {
        let ctx = TestContext::new().await;
        let service = ctx.data_sources();
        service.add(named("a", 0)).await.unwrap();
        service.add(named("b", 1)).await.unwrap();
        service.set_default("a").await.unwrap();

        service.delete("a").await.unwrap();

        let list = service.list().await.unwrap();
        assert!(list.iter().all(|s| !s.is_default));
        assert!(matches!(service.delete("a").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn default_never_outlives_a_concurrent_delete() {
        for _ in 0..20 {
            let ctx = TestContext::new().await;
            let service = ctx.data_sources();
            service.add(named("a", 0)).await.unwrap();

            let (set, deleted) = tokio::join!(service.set_default("a"), service.delete("a"));
            deleted.unwrap();
            assert!(matches!(set, Ok(()) | Err(AppError::NotFound(_))));

            let snapshot = ctx.system().export().await.unwrap();
            assert!(snapshot.data_sources.is_empty());
            assert_eq!(snapshot.default_data_source, None);
            ctx.system().import(snapshot).await.unwrap();
        }
    }

    #[tokio::test]
    async fn disabled_sources_cannot_be_default() {
        let ctx = TestContext::new().await;
        let service = ctx.data_sources();
        let mut draft = named("a", 0);
        draft.enabled = false;
        service.add(draft).await.unwrap();

        assert!(matches!(service.set_default("a").await, Err(AppError::NotFound(_))));
        assert!(matches!(service.set_default("ghost").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn disabling_the_default_clears_it() {
        let ctx = TestContext::new().await;
        let service = ctx.data_sources();
        service.add(named("a", 0)).await.unwrap();
        service.set_default("a").await.unwrap();

        service
            .update(
                "a",
                DataSourcePatch {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(service.list().await.unwrap().iter().all(|s| !s.is_default));
    }

    #[tokio::test]
    async fn resolve_follows_the_runtime_snapshot() {
        let ctx = TestContext::new().await;
        let service = ctx.data_sources();
        let mut us = named("yfinance", 0);
        us.source_type = Some(DataSourceType::Yfinance);
        us.market_categories = vec![MarketCategory::UsStocks];
        service.add(us).await.unwrap();
        let mut cn = named("akshare", 1);
        cn.market_categories = vec![MarketCategory::AShares];
        service.add(cn).await.unwrap();
        service.set_default("akshare").await.unwrap();

        let all: Vec<_> = service.resolve(None).await.into_iter().map(|s| s.name).collect();
        assert_eq!(all, vec!["akshare", "yfinance"]);

        let us_only: Vec<_> = service
            .resolve(Some(MarketCategory::UsStocks))
            .await
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(us_only, vec!["yfinance"]);
    }
}
