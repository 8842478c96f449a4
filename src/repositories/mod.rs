mod data_source;
mod database_config;
mod defaults;
mod llm;
mod simplified_llm;
mod snapshot;
mod system_settings;

use chrono::{SecondsFormat, Utc};
pub use data_source::DataSourceRepository;
pub use database_config::DatabaseConfigRepository;
pub use defaults::{llm_collection, DefaultsRepository, DATA_SOURCE_COLLECTION};
pub use llm::LlmConfigRepository;
pub use simplified_llm::SimplifiedLlmRepository;
pub use snapshot::{SnapshotRepository, StoreContents};
use sqlx::sqlite::SqlitePool;
pub use system_settings::SystemSettingsRepository;

#[derive(Clone)]
pub struct Repositories {
    pub data_sources: DataSourceRepository,
    pub databases: DatabaseConfigRepository,
    pub llm_configs: LlmConfigRepository,
    pub simplified_llm: SimplifiedLlmRepository,
    pub defaults: DefaultsRepository,
    pub settings: SystemSettingsRepository,
    pub snapshots: SnapshotRepository,
}

impl Repositories {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            data_sources: DataSourceRepository::new(pool.clone()),
            databases: DatabaseConfigRepository::new(pool.clone()),
            llm_configs: LlmConfigRepository::new(pool.clone()),
            simplified_llm: SimplifiedLlmRepository::new(pool.clone()),
            defaults: DefaultsRepository::new(pool.clone()),
            settings: SystemSettingsRepository::new(pool.clone()),
            snapshots: SnapshotRepository::new(pool),
        }
    }
}

/// Server-side timestamp written on every insert and update.
pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}
