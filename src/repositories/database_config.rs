use sqlx::sqlite::{SqliteConnection, SqlitePool};

use super::is_unique_violation;
use crate::domain::models::DatabaseConfigRecord;
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct DatabaseConfigRepository {
    pool: SqlitePool,
}

impl DatabaseConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> AppResult<Vec<DatabaseConfigRecord>> {
        let mut conn = self.pool.acquire().await?;
        list_database_configs(&mut conn).await
    }

    pub async fn find(&self, name: &str) -> AppResult<Option<DatabaseConfigRecord>> {
        let record = sqlx::query_as::<_, DatabaseConfigRecord>(
            r#"SELECT * FROM database_configs WHERE name = ?"#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn create(&self, record: &DatabaseConfigRecord) -> AppResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_database_config(&mut conn, record).await
    }

    pub async fn update(&self, record: &DatabaseConfigRecord) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE database_configs SET
                database_type = ?, host = ?, port = ?, username = ?, password_encrypted = ?,
                database_name = ?, connection_params = ?, pool_size = ?, max_overflow = ?,
                enabled = ?, description = ?, updated_at = ?
            WHERE name = ?
            "#,
        )
        .bind(&record.database_type)
        .bind(&record.host)
        .bind(record.port)
        .bind(&record.username)
        .bind(&record.password_encrypted)
        .bind(&record.database_name)
        .bind(&record.connection_params)
        .bind(record.pool_size)
        .bind(record.max_overflow)
        .bind(record.enabled)
        .bind(&record.description)
        .bind(&record.updated_at)
        .bind(&record.name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Database config '{}' not found",
                record.name
            )));
        }

        Ok(())
    }

    pub async fn delete(&self, name: &str) -> AppResult<()> {
        let result = sqlx::query(r#"DELETE FROM database_configs WHERE name = ?"#)
            .bind(name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Database config '{}' not found",
                name
            )));
        }

        Ok(())
    }
}

pub(crate) async fn list_database_configs(
    conn: &mut SqliteConnection,
) -> AppResult<Vec<DatabaseConfigRecord>> {
    let records = sqlx::query_as::<_, DatabaseConfigRecord>(
        r#"SELECT * FROM database_configs ORDER BY name ASC"#,
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(records)
}

pub(crate) async fn insert_database_config(
    conn: &mut SqliteConnection,
    record: &DatabaseConfigRecord,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO database_configs (
            name, database_type, host, port, username, password_encrypted, database_name,
            connection_params, pool_size, max_overflow, enabled, description,
            created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.name)
    .bind(&record.database_type)
    .bind(&record.host)
    .bind(record.port)
    .bind(&record.username)
    .bind(&record.password_encrypted)
    .bind(&record.database_name)
    .bind(&record.connection_params)
    .bind(record.pool_size)
    .bind(record.max_overflow)
    .bind(record.enabled)
    .bind(&record.description)
    .bind(&record.created_at)
    .bind(&record.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Database config '{}' already exists", record.name))
        } else {
            AppError::Database(e)
        }
    })?;

    Ok(())
}

pub(crate) async fn delete_all_database_configs(conn: &mut SqliteConnection) -> AppResult<()> {
    sqlx::query(r#"DELETE FROM database_configs"#)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
