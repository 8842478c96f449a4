use std::collections::BTreeMap;

use sqlx::sqlite::{SqliteConnection, SqlitePool};

use super::now;
use crate::error::AppResult;

pub const DATA_SOURCE_COLLECTION: &str = "datasource";

pub fn llm_collection(provider: &str) -> String {
    format!("llm:{}", provider)
}

/// One default pointer per collection. Moving a default is a single upsert,
/// so a collection never holds two defaults at once.
#[derive(Clone)]
pub struct DefaultsRepository {
    pool: SqlitePool,
}

impl DefaultsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, collection: &str) -> AppResult<Option<String>> {
        let key = sqlx::query_scalar::<_, String>(
            r#"SELECT entry_key FROM config_defaults WHERE collection = ?"#,
        )
        .bind(collection)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    /// Every `llm:<provider>` pointer, keyed by provider.
    pub async fn llm_defaults(&self) -> AppResult<BTreeMap<String, String>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            r#"SELECT collection, entry_key FROM config_defaults WHERE collection LIKE 'llm:%'"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(collection, key)| {
                collection
                    .strip_prefix("llm:")
                    .map(|provider| (provider.to_string(), key))
            })
            .collect())
    }
}

pub(crate) async fn set_default(
    conn: &mut SqliteConnection,
    collection: &str,
    entry_key: &str,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO config_defaults (collection, entry_key, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(collection) DO UPDATE SET
            entry_key = excluded.entry_key,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(collection)
    .bind(entry_key)
    .bind(now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Drops the pointer only when it still names `entry_key`.
pub(crate) async fn clear_default_if(
    conn: &mut SqliteConnection,
    collection: &str,
    entry_key: &str,
) -> AppResult<bool> {
    let result =
        sqlx::query(r#"DELETE FROM config_defaults WHERE collection = ? AND entry_key = ?"#)
            .bind(collection)
            .bind(entry_key)
            .execute(&mut *conn)
            .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn clear_llm_defaults(conn: &mut SqliteConnection) -> AppResult<()> {
    sqlx::query(r#"DELETE FROM config_defaults WHERE collection LIKE 'llm:%'"#)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub(crate) async fn clear_all_defaults(conn: &mut SqliteConnection) -> AppResult<()> {
    sqlx::query(r#"DELETE FROM config_defaults"#)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
