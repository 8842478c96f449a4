mod connection_test;
mod data_source;
mod database_config;
mod llm;
mod simplified_llm;
mod system_config;

pub use connection_test::*;
pub use data_source::*;
pub use database_config::*;
pub use llm::*;
pub use simplified_llm::*;
pub use system_config::*;

use std::sync::Arc;

use sqlx::sqlite::SqlitePool;

use crate::config::{EnvLookup, ProbeSettings};
use crate::infrastructure::{Prober, RuntimeCache};
use crate::repositories::Repositories;
use crate::utils::{mask_secret, SecretCipher};

/// Every service the API hands out, wired over one pool and one cipher.
#[derive(Clone)]
pub struct AppServices {
    pub cache: Arc<RuntimeCache>,
    pub connection_tests: Arc<ConnectionTestService>,
    pub data_sources: Arc<DataSourceService>,
    pub databases: Arc<DatabaseConfigService>,
    pub llm: Arc<LlmConfigService>,
    pub models: Arc<SimplifiedLlmService>,
    pub system: Arc<SystemConfigService>,
}

impl AppServices {
    pub fn new(
        pool: SqlitePool,
        cipher: SecretCipher,
        prober: Arc<dyn Prober>,
        probe: ProbeSettings,
        env: EnvLookup,
    ) -> Self {
        let repos = Repositories::new(pool);
        let cache = Arc::new(RuntimeCache::new(
            repos.snapshots.clone(),
            cipher.clone(),
            env.clone(),
        ));
        let connection_tests = Arc::new(ConnectionTestService::new(prober, probe));

        Self {
            data_sources: Arc::new(DataSourceService::new(
                repos.data_sources.clone(),
                repos.defaults.clone(),
                cipher.clone(),
                cache.clone(),
            )),
            databases: Arc::new(DatabaseConfigService::new(
                repos.databases.clone(),
                cipher.clone(),
                cache.clone(),
                connection_tests.clone(),
            )),
            llm: Arc::new(LlmConfigService::new(
                repos.llm_configs.clone(),
                cipher.clone(),
                cache.clone(),
                connection_tests.clone(),
            )),
            models: Arc::new(SimplifiedLlmService::new(
                repos.simplified_llm.clone(),
                repos.llm_configs.clone(),
                repos.defaults.clone(),
                cipher.clone(),
            )),
            system: Arc::new(SystemConfigService::new(repos, cipher, cache.clone(), env)),
            connection_tests,
            cache,
        }
    }
}

/// Opens a sealed secret for display only. A secret that no longer opens
/// (the encryption key changed) still reports as present.
pub(crate) fn reveal_masked(cipher: &SecretCipher, sealed: Option<&str>) -> Option<String> {
    let sealed = sealed?;
    match cipher.decrypt(sealed) {
        Ok(secret) => Some(mask_secret(&secret)),
        Err(e) => {
            tracing::warn!(error = %e, "Stored secret cannot be opened");
            Some("****".to_string())
        },
    }
}
