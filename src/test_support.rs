use std::collections::HashMap;
use std::sync::Arc;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::config::{EnvLookup, ProbeSettings};
use crate::domain::services::{
    AppServices, DataSourceService, DatabaseConfigService, LlmConfigService,
    SimplifiedLlmService, SystemConfigService,
};
use crate::infrastructure::MockProber;
use crate::repositories::Repositories;
use crate::utils::SecretCipher;

/// A single-connection in-memory store with the schema applied. The pool
/// keeps its one connection alive, otherwise the database would vanish.
pub(crate) async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations apply");
    pool
}

pub(crate) struct TestContext {
    pub repos: Repositories,
    pub services: AppServices,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::build(MockProber::new(), &[]).await
    }

    pub async fn with_prober(prober: MockProber) -> Self {
        Self::build(prober, &[]).await
    }

    pub async fn with_env(vars: &[(&str, &str)]) -> Self {
        Self::build(MockProber::new(), vars).await
    }

    async fn build(prober: MockProber, vars: &[(&str, &str)]) -> Self {
        let pool = memory_pool().await;
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let env: EnvLookup = Arc::new(move |key| vars.get(key).cloned());

        let services = AppServices::new(
            pool.clone(),
            SecretCipher::new([7u8; 32]),
            Arc::new(prober),
            ProbeSettings::default(),
            env,
        );

        Self {
            repos: Repositories::new(pool),
            services,
        }
    }

    pub fn data_sources(&self) -> Arc<DataSourceService> {
        self.services.data_sources.clone()
    }

    pub fn databases(&self) -> Arc<DatabaseConfigService> {
        self.services.databases.clone()
    }

    pub fn llm(&self) -> Arc<LlmConfigService> {
        self.services.llm.clone()
    }

    pub fn simplified_llm(&self) -> Arc<SimplifiedLlmService> {
        self.services.models.clone()
    }

    pub fn system(&self) -> Arc<SystemConfigService> {
        self.services.system.clone()
    }
}
