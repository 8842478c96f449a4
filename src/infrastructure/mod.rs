mod probe;
mod runtime_cache;

pub use probe::*;
pub use runtime_cache::*;
