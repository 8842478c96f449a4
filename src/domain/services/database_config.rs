use std::sync::Arc;

use validator::Validate;

use super::connection_test::{ConnectionTestService, DatabaseProbeTarget};
use super::reveal_masked;
use crate::domain::models::{
    ConnectionTestResult, DatabaseConfigCreated, DatabaseConfigDraft, DatabaseConfigPatch,
    DatabaseConfigRecord, DatabaseConfigResponse, DEFAULT_MAX_OVERFLOW, DEFAULT_POOL_SIZE,
};
use crate::error::{AppError, AppResult};
use crate::infrastructure::RuntimeCache;
use crate::repositories::{now, DatabaseConfigRepository};
use crate::utils::SecretCipher;

#[derive(Clone)]
pub struct DatabaseConfigService {
    repo: DatabaseConfigRepository,
    cipher: SecretCipher,
    cache: Arc<RuntimeCache>,
    tests: Arc<ConnectionTestService>,
}

impl DatabaseConfigService {
    pub fn new(
        repo: DatabaseConfigRepository,
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

    pub async fn list(&self) -> AppResult<Vec<DatabaseConfigResponse>> {
        let records = self.repo.list().await?;
        Ok(records
            .iter()
            .map(|r| database_config_response(&self.cipher, r))
            .collect())
    }

    pub async fn get(&self, name: &str) -> AppResult<DatabaseConfigResponse> {
        let record = self.find(name).await?;
        Ok(database_config_response(&self.cipher, &record))
    }

    pub async fn add(&self, mut draft: DatabaseConfigDraft) -> AppResult<DatabaseConfigCreated> {
        draft.normalize();
        draft.validate()?;

        let record = seal_database_config(&self.cipher, &draft, None)?;
        if self.repo.find(&record.name).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Database config '{}' already exists",
                record.name
            )));
        }
        self.repo.create(&record).await?;
        self.cache.refresh().await;

        tracing::info!(name = %record.name, database_type = %record.database_type, "Database config added");
        Ok(DatabaseConfigCreated { name: record.name })
    }

    pub async fn update(
        &self,
        name: &str,
        patch: DatabaseConfigPatch,
    ) -> AppResult<DatabaseConfigResponse> {
        let existing = self.find(name).await?;

        let mut draft = existing.to_draft();
        draft.apply(patch);
        draft.normalize();
        draft.validate()?;

        let record = seal_database_config(&self.cipher, &draft, Some(&existing))?;
        self.repo.update(&record).await?;
        self.cache.refresh().await;

        tracing::info!(name = %name, "Database config updated");
        Ok(database_config_response(&self.cipher, &record))
    }

    pub async fn delete(&self, name: &str) -> AppResult<()> {
        self.repo.delete(name).await?;
        self.cache.refresh().await;
        tracing::info!(name = %name, "Database config deleted");
        Ok(())
    }

    /// Probes a stored entry using its stored password.
    pub async fn test(
        &self,
        name: &str,
        timeout_secs: Option<u64>,
    ) -> AppResult<ConnectionTestResult> {
        let record = self.find(name).await?;
        let kind = record.kind().ok_or_else(|| {
            AppError::Internal(format!(
                "Stored database type '{}' is not recognised",
                record.database_type
            ))
        })?;
        let password = self
            .cipher
            .decrypt_opt(record.password_encrypted.as_deref())?;

        let target = DatabaseProbeTarget {
            kind,
            host: record.host,
            port: record.port,
            password,
        };
        let result = self
            .tests
            .probe_database(&target, self.tests.timeout(timeout_secs))
            .await;

        tracing::info!(name = %name, success = result.success, "Database connectivity tested");
        Ok(result)
    }

    async fn find(&self, name: &str) -> AppResult<DatabaseConfigRecord> {
        self.repo
            .find(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Database config '{}' not found", name)))
    }
}

pub(crate) fn seal_database_config(
    cipher: &SecretCipher,
    draft: &DatabaseConfigDraft,
    existing: Option<&DatabaseConfigRecord>,
) -> AppResult<DatabaseConfigRecord> {
    let (Some(name), Some(kind), Some(host), Some(port)) =
        (draft.name.clone(), draft.kind, draft.host.clone(), draft.port)
    else {
        return Err(AppError::Validation(
            "name, type, host and port are required".to_string(),
        ));
    };

    let password_encrypted = match &draft.password {
        Some(password) => Some(cipher.encrypt(password)?),
        None => existing.and_then(|e| e.password_encrypted.clone()),
    };
    let timestamp = now();

    Ok(DatabaseConfigRecord {
        name,
        database_type: kind.as_str().to_string(),
        host,
        port,
        username: draft.username.clone(),
        password_encrypted,
        database_name: draft.database.clone(),
        connection_params: serde_json::to_string(&draft.connection_params)?,
        pool_size: draft.pool_size.unwrap_or(DEFAULT_POOL_SIZE),
        max_overflow: draft.max_overflow.unwrap_or(DEFAULT_MAX_OVERFLOW),
        enabled: draft.enabled,
        description: draft.description.clone(),
        created_at: existing
            .map(|e| e.created_at.clone())
            .unwrap_or_else(|| timestamp.clone()),
        updated_at: timestamp,
    })
}

pub(crate) fn database_config_response(
    cipher: &SecretCipher,
    record: &DatabaseConfigRecord,
) -> DatabaseConfigResponse {
    let password = reveal_masked(cipher, record.password_encrypted.as_deref());

    DatabaseConfigResponse {
        name: record.name.clone(),
        database_type: record.database_type.clone(),
        host: record.host.clone(),
        port: record.port,
        username: record.username.clone(),
        has_password: password.is_some(),
        password,
        database: record.database_name.clone(),
        connection_params: record.connection_params_json(),
        pool_size: record.pool_size,
        max_overflow: record.max_overflow,
        enabled: record.enabled,
        description: record.description.clone(),
        created_at: record.created_at.clone(),
        updated_at: record.updated_at.clone(),
    }
}
