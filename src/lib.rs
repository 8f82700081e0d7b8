//! Consul KV Config - typed configuration reads from a Consul KV store
//!
//! Values are cached locally for a configurable duration to save round
//! trips, and coerced to strings, integers, floats, durations or JSON.

pub mod accessor;
pub mod cache;
pub mod coerce;
pub mod config;
pub mod error;
pub mod store;
pub mod tasks;

pub use accessor::{ConfigAccessor, ConfigSource};
pub use config::Config;
pub use error::{AccessorError, Result, StoreError};
pub use store::{ConsulKv, KvPair, KvStore};
