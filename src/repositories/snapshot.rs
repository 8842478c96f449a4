use std::collections::BTreeMap;

use serde_json::Value as JsonValue;
use sqlx::sqlite::SqlitePool;

use super::data_source::{delete_all_data_sources, insert_data_source, list_data_sources};
use super::database_config::{
    delete_all_database_configs, insert_database_config, list_database_configs,
};
use super::defaults::{clear_all_defaults, set_default};
use super::llm::{delete_all_llm_configs, insert_llm_config, list_llm_configs};
use super::simplified_llm::{
    delete_all_simplified_llm_configs, insert_simplified_llm, list_simplified_llm_configs,
};
use super::system_settings::{delete_all_settings, load_settings, upsert_setting};
use crate::domain::models::{
    DataSourceRecord, DatabaseConfigRecord, LlmConfigRecord, SimplifiedLlmRecord,
};
use crate::error::AppResult;

/// Every stored row, read under one transaction so the parts agree.
#[derive(Debug, Clone, Default)]
pub struct StoreContents {
    pub data_sources: Vec<DataSourceRecord>,
    pub databases: Vec<DatabaseConfigRecord>,
    pub llm_configs: Vec<LlmConfigRecord>,
    pub simplified_llm_configs: Vec<SimplifiedLlmRecord>,
    /// collection -> entry key
    pub defaults: BTreeMap<String, String>,
    pub settings: BTreeMap<String, JsonValue>,
}

#[derive(Clone)]
pub struct SnapshotRepository {
    pool: SqlitePool,
}

impl SnapshotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn read_all(&self) -> AppResult<StoreContents> {
        let mut tx = self.pool.begin().await?;

        let data_sources = list_data_sources(&mut tx).await?;
        let databases = list_database_configs(&mut tx).await?;
        let llm_configs = list_llm_configs(&mut tx).await?;
        let simplified_llm_configs = list_simplified_llm_configs(&mut tx).await?;
        let defaults = sqlx::query_as::<_, (String, String)>(
            r#"SELECT collection, entry_key FROM config_defaults"#,
        )
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();
        let settings = load_settings(&mut tx).await?;

        tx.commit().await?;

        Ok(StoreContents {
            data_sources,
            databases,
            llm_configs,
            simplified_llm_configs,
            defaults,
            settings,
        })
    }

    /// Swaps the stored state for `contents`. Any failure rolls the whole
    /// replacement back.
    pub async fn replace_all(&self, contents: &StoreContents) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        clear_all_defaults(&mut tx).await?;
        delete_all_data_sources(&mut tx).await?;
        delete_all_database_configs(&mut tx).await?;
        delete_all_llm_configs(&mut tx).await?;
        delete_all_simplified_llm_configs(&mut tx).await?;
        delete_all_settings(&mut tx).await?;

        for record in &contents.data_sources {
            insert_data_source(&mut tx, record).await?;
        }
        for record in &contents.databases {
            insert_database_config(&mut tx, record).await?;
        }
        for record in &contents.llm_configs {
            insert_llm_config(&mut tx, record).await?;
        }
        for record in &contents.simplified_llm_configs {
            insert_simplified_llm(&mut tx, record).await?;
        }
        for (collection, key) in &contents.defaults {
            set_default(&mut tx, collection, key).await?;
        }
        for (key, value) in &contents.settings {
            upsert_setting(&mut tx, key, value).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
