// Result cache module
// Author: kelexine (https://github.com/kelexine)

pub mod manager;
pub mod models;

pub use manager::{fingerprint, ResultCache};
pub use models::{CacheStats, CachedImage};
