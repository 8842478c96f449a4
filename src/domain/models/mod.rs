mod connection_test;
mod data_source;
mod database_config;
mod llm;
mod simplified_llm;
mod snapshot;
mod system_settings;
mod templates;

pub use connection_test::*;
pub use data_source::*;
pub use database_config::*;
pub use llm::*;
pub use simplified_llm::*;
pub use snapshot::*;
pub use system_settings::*;
pub use templates::*;
