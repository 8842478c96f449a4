pub mod extractors;
pub mod handlers;
pub mod routes;

pub use routes::{build_router, create_router};
