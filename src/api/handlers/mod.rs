mod data_sources;
mod databases;
mod health;
mod llm;
mod models;
mod system;

pub use data_sources::*;
pub use databases::*;
pub use health::*;
pub use llm::*;
pub use models::*;
pub use system::*;
