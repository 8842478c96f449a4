pub mod api;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod middleware;
pub mod openapi;
pub mod repositories;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{build_router, create_router};
pub use client::{ClientError, ConfigClient, SettingsWorkbench};
pub use config::Settings;
pub use domain::services::AppServices;
pub use error::{AppError, AppResult};
pub use openapi::{generate_openapi_json, get_openapi_spec};
pub use repositories::Repositories;
