//! Store Client Module
//!
//! The key-value store the accessor reads from, behind a small trait so the
//! accessor never depends on a concrete client.

mod consul;

pub use consul::ConsulKv;

use std::borrow::Cow;

use async_trait::async_trait;

use crate::error::StoreError;

// == KV Pair ==
/// A key-value pair as held by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    /// Raw value bytes, empty when the store holds no value for the key
    pub value: Vec<u8>,
    pub flags: u64,
    pub modify_index: u64,
}

impl KvPair {
    /// Value as text. Invalid UTF-8 sequences are replaced rather than rejected.
    pub fn value_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

// == KV Store ==
/// Read-only access to a key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Looks up `key`.
    ///
    /// Returns `Ok(None)` when the key is absent; errors are reserved for
    /// communication and decoding failures.
    async fn get(&self, key: &str) -> Result<Option<KvPair>, StoreError>;
}
