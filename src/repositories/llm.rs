use sqlx::sqlite::{SqliteConnection, SqlitePool};

use crate::domain::models::LlmConfigRecord;
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct LlmConfigRepository {
    pool: SqlitePool,
}

impl LlmConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> AppResult<Vec<LlmConfigRecord>> {
        let mut conn = self.pool.acquire().await?;
        list_llm_configs(&mut conn).await
    }

    pub async fn find(&self, id: &str) -> AppResult<Option<LlmConfigRecord>> {
        let record =
            sqlx::query_as::<_, LlmConfigRecord>(r#"SELECT * FROM llm_configs WHERE id = ?"#)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record)
    }

    pub async fn create(&self, record: &LlmConfigRecord) -> AppResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_llm_config(&mut conn, record).await
    }

    pub async fn update(&self, record: &LlmConfigRecord) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE llm_configs SET
                name = ?, display_name = ?, model = ?, api_key_encrypted = ?, base_url = ?,
                temperature = ?, max_tokens = ?, timeout = ?, enabled = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.name)
        .bind(&record.display_name)
        .bind(&record.model)
        .bind(&record.api_key_encrypted)
        .bind(&record.base_url)
        .bind(record.temperature)
        .bind(record.max_tokens)
        .bind(record.timeout)
        .bind(record.enabled)
        .bind(&record.updated_at)
        .bind(&record.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "LLM config '{}' not found",
                record.id
            )));
        }

        Ok(())
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let result = sqlx::query(r#"DELETE FROM llm_configs WHERE id = ?"#)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("LLM config '{}' not found", id)));
        }

        Ok(())
    }
}

pub(crate) async fn list_llm_configs(
    conn: &mut SqliteConnection,
) -> AppResult<Vec<LlmConfigRecord>> {
    let records = sqlx::query_as::<_, LlmConfigRecord>(
        r#"SELECT * FROM llm_configs ORDER BY name ASC, created_at ASC"#,
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(records)
}

pub(crate) async fn insert_llm_config(
    conn: &mut SqliteConnection,
    record: &LlmConfigRecord,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO llm_configs (
            id, name, display_name, model, api_key_encrypted, base_url, temperature,
            max_tokens, timeout, enabled, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.id)
    .bind(&record.name)
    .bind(&record.display_name)
    .bind(&record.model)
    .bind(&record.api_key_encrypted)
    .bind(&record.base_url)
    .bind(record.temperature)
    .bind(record.max_tokens)
    .bind(record.timeout)
    .bind(record.enabled)
    .bind(&record.created_at)
    .bind(&record.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn delete_all_llm_configs(conn: &mut SqliteConnection) -> AppResult<()> {
    sqlx::query(r#"DELETE FROM llm_configs"#)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
