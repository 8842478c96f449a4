use sqlx::sqlite::{SqliteConnection, SqlitePool};

use super::defaults::{clear_default_if, DATA_SOURCE_COLLECTION};
use super::{is_unique_violation, now};
use crate::domain::models::DataSourceRecord;
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct DataSourceRepository {
    pool: SqlitePool,
}

impl DataSourceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> AppResult<Vec<DataSourceRecord>> {
        let mut conn = self.pool.acquire().await?;
        list_data_sources(&mut conn).await
    }

    pub async fn find(&self, name: &str) -> AppResult<Option<DataSourceRecord>> {
        let record = sqlx::query_as::<_, DataSourceRecord>(
            r#"SELECT * FROM data_source_configs WHERE name = ?"#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Points the default at `name` in one statement, and only while that
    /// source exists and is enabled. Returns false when nothing was written.
    pub async fn set_default(&self, name: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO config_defaults (collection, entry_key, updated_at)
            SELECT ?, name, ? FROM data_source_configs WHERE name = ? AND enabled = 1
            ON CONFLICT(collection) DO UPDATE SET
                entry_key = excluded.entry_key,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(DATA_SOURCE_COLLECTION)
        .bind(now())
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn create(&self, record: &DataSourceRecord) -> AppResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_data_source(&mut conn, record).await
    }

    /// Rewrites every mutable column. When the record is now disabled the
    /// default pointer is cleared in the same transaction.
    pub async fn update(&self, record: &DataSourceRecord) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE data_source_configs SET
                source_type = ?, api_key_encrypted = ?, api_secret_encrypted = ?,
                endpoint = ?, timeout = ?, rate_limit = ?, enabled = ?, priority = ?,
                config_params = ?, market_categories = ?, description = ?, updated_at = ?
            WHERE name = ?
            "#,
        )
        .bind(&record.source_type)
        .bind(&record.api_key_encrypted)
        .bind(&record.api_secret_encrypted)
        .bind(&record.endpoint)
        .bind(record.timeout)
        .bind(record.rate_limit)
        .bind(record.enabled)
        .bind(record.priority)
        .bind(&record.config_params)
        .bind(&record.market_categories)
        .bind(&record.description)
        .bind(&record.updated_at)
        .bind(&record.name)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Data source '{}' not found",
                record.name
            )));
        }

        if !record.enabled {
            clear_default_if(&mut tx, DATA_SOURCE_COLLECTION, &record.name).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Returns whether the deleted entry was the default.
    pub async fn delete(&self, name: &str) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(r#"DELETE FROM data_source_configs WHERE name = ?"#)
            .bind(name)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Data source '{}' not found", name)));
        }

        let was_default = clear_default_if(&mut tx, DATA_SOURCE_COLLECTION, name).await?;
        tx.commit().await?;

        Ok(was_default)
    }
}

pub(crate) async fn list_data_sources(
    conn: &mut SqliteConnection,
) -> AppResult<Vec<DataSourceRecord>> {
    let records = sqlx::query_as::<_, DataSourceRecord>(
        r#"SELECT * FROM data_source_configs ORDER BY priority ASC, name ASC"#,
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(records)
}

pub(crate) async fn insert_data_source(
    conn: &mut SqliteConnection,
    record: &DataSourceRecord,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO data_source_configs (
            name, source_type, api_key_encrypted, api_secret_encrypted, endpoint,
            timeout, rate_limit, enabled, priority, config_params, market_categories,
            description, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.name)
    .bind(&record.source_type)
    .bind(&record.api_key_encrypted)
    .bind(&record.api_secret_encrypted)
    .bind(&record.endpoint)
    .bind(record.timeout)
    .bind(record.rate_limit)
    .bind(record.enabled)
    .bind(record.priority)
    .bind(&record.config_params)
    .bind(&record.market_categories)
    .bind(&record.description)
    .bind(&record.created_at)
    .bind(&record.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Data source '{}' already exists", record.name))
        } else {
            AppError::Database(e)
        }
    })?;

    Ok(())
}

pub(crate) async fn delete_all_data_sources(conn: &mut SqliteConnection) -> AppResult<()> {
    sqlx::query(r#"DELETE FROM data_source_configs"#)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
