//! Cache Module
//!
//! Time-bounded memoization of raw string values read from the store.

mod entry;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use stats::CacheStats;
pub use store::{CacheStore, SharedCache};
