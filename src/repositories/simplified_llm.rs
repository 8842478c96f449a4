use sqlx::sqlite::{SqliteConnection, SqlitePool};

use super::defaults::{clear_default_if, clear_llm_defaults, llm_collection, set_default};
use super::now;
use crate::domain::models::SimplifiedLlmRecord;
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct SimplifiedLlmRepository {
    pool: SqlitePool,
}

impl SimplifiedLlmRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> AppResult<Vec<SimplifiedLlmRecord>> {
        let mut conn = self.pool.acquire().await?;
        list_simplified_llm_configs(&mut conn).await
    }

    pub async fn find(&self, id: &str) -> AppResult<Option<SimplifiedLlmRecord>> {
        let record = sqlx::query_as::<_, SimplifiedLlmRecord>(
            r#"SELECT * FROM simplified_llm_configs WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn create(&self, record: &SimplifiedLlmRecord) -> AppResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_simplified_llm(&mut conn, record).await
    }

    /// `previous_provider` is the provider the record had before this write;
    /// its default pointer is dropped when the record moves away or is disabled.
    pub async fn update(
        &self,
        record: &SimplifiedLlmRecord,
        previous_provider: &str,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE simplified_llm_configs SET
                provider = ?, provider_name = ?, model_name = ?, model_display_name = ?,
                api_key_encrypted = ?, api_base = ?, temperature = ?, max_tokens = ?,
                timeout = ?, enabled = ?, capabilities = ?, suitable_for = ?,
                input_price = ?, output_price = ?, currency = ?, description = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.provider)
        .bind(&record.provider_name)
        .bind(&record.model_name)
        .bind(&record.model_display_name)
        .bind(&record.api_key_encrypted)
        .bind(&record.api_base)
        .bind(record.temperature)
        .bind(record.max_tokens)
        .bind(record.timeout)
        .bind(record.enabled)
        .bind(&record.capabilities)
        .bind(&record.suitable_for)
        .bind(record.input_price)
        .bind(record.output_price)
        .bind(&record.currency)
        .bind(&record.description)
        .bind(&record.updated_at)
        .bind(&record.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "LLM model config '{}' not found",
                record.id
            )));
        }

        if !record.enabled || record.provider != previous_provider {
            clear_default_if(&mut tx, &llm_collection(previous_provider), &record.id).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Points the provider default at `id` in one statement, and only while
    /// the entry exists and is enabled. Returns the provider whose default
    /// moved, or `None` when nothing was written.
    pub async fn set_default(&self, id: &str) -> AppResult<Option<String>> {
        let collection = sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO config_defaults (collection, entry_key, updated_at)
            SELECT 'llm:' || provider, id, ? FROM simplified_llm_configs
            WHERE id = ? AND enabled = 1
            ON CONFLICT(collection) DO UPDATE SET
                entry_key = excluded.entry_key,
                updated_at = excluded.updated_at
            RETURNING collection
            "#,
        )
        .bind(now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(collection.and_then(|c| c.strip_prefix("llm:").map(str::to_string)))
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let provider = sqlx::query_scalar::<_, String>(
            r#"SELECT provider FROM simplified_llm_configs WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("LLM model config '{}' not found", id)))?;

        sqlx::query(r#"DELETE FROM simplified_llm_configs WHERE id = ?"#)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        clear_default_if(&mut tx, &llm_collection(&provider), id).await?;
        tx.commit().await?;

        Ok(())
    }

    /// Replaces the whole collection and its per-provider defaults in one
    /// transaction. `defaults` pairs a provider key with a record id. Unless
    /// `force` is set, an existing collection is left alone and reported as
    /// a conflict.
    pub async fn replace_all(
        &self,
        records: &[SimplifiedLlmRecord],
        defaults: &[(String, String)],
        force: bool,
    ) -> AppResult<usize> {
        let mut tx = self.pool.begin().await?;

        let replaced =
            sqlx::query_scalar::<_, i64>(r#"SELECT COUNT(*) FROM simplified_llm_configs"#)
                .fetch_one(&mut *tx)
                .await?;
        if !force && replaced > 0 {
            return Err(AppError::Conflict(
                "Simplified LLM configs already exist; pass force to replace them".to_string(),
            ));
        }
        delete_all_simplified_llm_configs(&mut tx).await?;
        clear_llm_defaults(&mut tx).await?;

        for record in records {
            insert_simplified_llm(&mut tx, record).await?;
        }
        for (provider, id) in defaults {
            set_default(&mut tx, &llm_collection(provider), id).await?;
        }

        tx.commit().await?;
        Ok(replaced as usize)
    }
}

pub(crate) async fn list_simplified_llm_configs(
    conn: &mut SqliteConnection,
) -> AppResult<Vec<SimplifiedLlmRecord>> {
    let records = sqlx::query_as::<_, SimplifiedLlmRecord>(
        r#"SELECT * FROM simplified_llm_configs ORDER BY provider ASC, model_name ASC"#,
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(records)
}

pub(crate) async fn insert_simplified_llm(
    conn: &mut SqliteConnection,
    record: &SimplifiedLlmRecord,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO simplified_llm_configs (
            id, provider, provider_name, model_name, model_display_name, api_key_encrypted,
            api_base, temperature, max_tokens, timeout, enabled, capabilities, suitable_for,
            input_price, output_price, currency, description, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.id)
    .bind(&record.provider)
    .bind(&record.provider_name)
    .bind(&record.model_name)
    .bind(&record.model_display_name)
    .bind(&record.api_key_encrypted)
    .bind(&record.api_base)
    .bind(record.temperature)
    .bind(record.max_tokens)
    .bind(record.timeout)
    .bind(record.enabled)
    .bind(&record.capabilities)
    .bind(&record.suitable_for)
    .bind(record.input_price)
    .bind(record.output_price)
    .bind(&record.currency)
    .bind(&record.description)
    .bind(&record.created_at)
    .bind(&record.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn delete_all_simplified_llm_configs(
    conn: &mut SqliteConnection,
) -> AppResult<()> {
    sqlx::query(r#"DELETE FROM simplified_llm_configs"#)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
