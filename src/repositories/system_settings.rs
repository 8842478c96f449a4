use std::collections::BTreeMap;

use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnection, SqlitePool};

use super::now;
use crate::error::AppResult;

/// Stored setting overrides. Values are JSON text so any type survives.
#[derive(Clone)]
pub struct SystemSettingsRepository {
    pool: SqlitePool,
}

impl SystemSettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn all(&self) -> AppResult<BTreeMap<String, JsonValue>> {
        let mut conn = self.pool.acquire().await?;
        load_settings(&mut conn).await
    }

    /// Writes every entry in one transaction; `null` removes the override.
    pub async fn upsert_many(&self, values: &BTreeMap<String, JsonValue>) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in values {
            if value.is_null() {
                sqlx::query(r#"DELETE FROM system_settings WHERE key = ?"#)
                    .bind(key)
                    .execute(&mut *tx)
                    .await?;
            } else {
                upsert_setting(&mut tx, key, value).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

pub(crate) async fn load_settings(
    conn: &mut SqliteConnection,
) -> AppResult<BTreeMap<String, JsonValue>> {
    let rows = sqlx::query_as::<_, (String, String)>(
        r#"SELECT key, value FROM system_settings ORDER BY key ASC"#,
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut settings = BTreeMap::new();
    for (key, raw) in rows {
        match serde_json::from_str::<JsonValue>(&raw) {
            Ok(value) => {
                settings.insert(key, value);
            },
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Skipping unreadable system setting");
            },
        }
    }
    Ok(settings)
}

pub(crate) async fn upsert_setting(
    conn: &mut SqliteConnection,
    key: &str,
    value: &JsonValue,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO system_settings (key, value, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(serde_json::to_string(value)?)
    .bind(now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn delete_all_settings(conn: &mut SqliteConnection) -> AppResult<()> {
    sqlx::query(r#"DELETE FROM system_settings"#)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
