//! Accessor Module
//!
//! Typed getters over a single cache-augmented raw read path.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::{CacheStats, CacheStore, SharedCache};
use crate::coerce;
use crate::config::Config;
use crate::error::{AccessorError, ParseValueError, Result, StoreError};
use crate::store::{ConsulKv, KvStore};
use crate::tasks::spawn_cleanup_task;

// == Config Source ==
/// Typed configuration reads by key.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Raw value, `""` when the key is absent.
    async fn get_string(&self, key: &str) -> Result<String>;
    async fn get_int(&self, key: &str) -> Result<i64>;
    async fn get_float(&self, key: &str) -> Result<f64>;
    async fn get_duration(&self, key: &str) -> Result<Duration>;
}

// == Config Accessor ==
/// Reads configuration values from a KV store through a TTL cache.
///
/// Cloning is cheap and every clone shares the same store client and cache.
/// Create one at startup and hand clones to consumers.
///
/// An absent key reads as `""` from [`get_string`](Self::get_string); the
/// typed getters report it as a parse error since the empty string is not a
/// number or duration.
#[derive(Clone)]
pub struct ConfigAccessor {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    store: Arc<dyn KvStore>,
    cache: SharedCache,
    cleanup: Option<JoinHandle<()>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup.take() {
            handle.abort();
        }
    }
}

impl ConfigAccessor {
    // == Constructors ==
    /// Connects to the Consul agent described by `config`.
    ///
    /// Must be called within a tokio runtime unless `cleanup_interval` is zero.
    pub fn new(config: Config) -> Result<Self> {
        let store = ConsulKv::new(&config).map_err(|source| AccessorError::Construction {
            reason: "cannot create consul client".to_string(),
            source: Some(source),
        })?;
        Self::with_store(config, Arc::new(store))
    }

    /// Uses an existing store client.
    pub fn with_store(config: Config, store: Arc<dyn KvStore>) -> Result<Self> {
        let cache = CacheStore::shared(config.default_cache_time);

        let cleanup = if config.cleanup_interval.is_zero() {
            None
        } else {
            Handle::try_current().map_err(|e| AccessorError::Construction {
                reason: format!("cache cleanup task needs a tokio runtime: {e}"),
                source: None,
            })?;
            Some(spawn_cleanup_task(&cache, config.cleanup_interval))
        };

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                cache,
                cleanup,
            }),
        })
    }

    /// Settings this accessor was built with.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Snapshot of the cache counters.
    pub async fn cache_stats(&self) -> CacheStats {
        self.inner.cache.read().await.stats()
    }

    // == Typed Getters ==
    /// Raw value for `key`, `""` if the key is absent.
    pub async fn get_string(&self, key: &str) -> Result<String> {
        self.get_raw(key)
            .await
            .map_err(|source| AccessorError::Fetch {
                key: key.to_string(),
                source,
            })
    }

    /// Value parsed as a base-10 `i64`.
    pub async fn get_int(&self, key: &str) -> Result<i64> {
        self.get_parsed(key, coerce::parse_int).await
    }

    /// Value parsed as an `f64`.
    pub async fn get_float(&self, key: &str) -> Result<f64> {
        self.get_parsed(key, coerce::parse_float).await
    }

    /// Value parsed as a duration string such as `"250ms"` or `"1h30m"`.
    pub async fn get_duration(&self, key: &str) -> Result<Duration> {
        self.get_parsed(key, coerce::parse_duration_value).await
    }

    /// Value deserialized from JSON, e.g. a map of error codes.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get_parsed(key, coerce::parse_json::<T>).await
    }

    async fn get_parsed<T>(
        &self,
        key: &str,
        parse: fn(&str, &str) -> std::result::Result<T, ParseValueError>,
    ) -> Result<T> {
        let raw = self.get_string(key).await?;
        parse(key, &raw).map_err(|source| AccessorError::Parse {
            key: key.to_string(),
            source,
        })
    }

    // == Raw Read Path ==
    /// Cache first, store on a miss. Only present keys are cached.
    async fn get_raw(&self, key: &str) -> std::result::Result<String, StoreError> {
        let cached = self.inner.cache.write().await.get(key);
        if let Some(value) = cached {
            debug!(key, "Config cache hit");
            return Ok(value);
        }

        debug!(key, "Config cache miss, fetching from store");
        let Some(pair) = self.inner.store.get(key).await? else {
            debug!(key, "Key absent in store");
            return Ok(String::new());
        };

        let value = pair.value_str().into_owned();
        self.inner
            .cache
            .write()
            .await
            .set(key.to_string(), value.clone());
        Ok(value)
    }
}

#[async_trait]
impl ConfigSource for ConfigAccessor {
    async fn get_string(&self, key: &str) -> Result<String> {
        ConfigAccessor::get_string(self, key).await
    }

    async fn get_int(&self, key: &str) -> Result<i64> {
        ConfigAccessor::get_int(self, key).await
    }

    async fn get_float(&self, key: &str) -> Result<f64> {
        ConfigAccessor::get_float(self, key).await
    }

    async fn get_duration(&self, key: &str) -> Result<Duration> {
        ConfigAccessor::get_duration(self, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::error::Error as _;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use reqwest::StatusCode;

    use crate::error::ValueType;
    use crate::store::KvPair;

    // == Test Store ==
    #[derive(Default)]
    struct MemoryKv {
        values: Mutex<HashMap<String, String>>,
        fetches: AtomicUsize,
        failing: AtomicBool,
    }

    impl MemoryKv {
        fn with(pairs: &[(&str, &str)]) -> Arc<Self> {
            let store = Self::default();
            for (key, value) in pairs {
                store.put(key, value);
            }
            Arc::new(store)
        }

        fn put(&self, key: &str, value: &str) {
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl KvStore for MemoryKv {
        async fn get(&self, key: &str) -> std::result::Result<Option<KvPair>, StoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Status {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    body: "no leader".to_string(),
                });
            }
            Ok(self.values.lock().unwrap().get(key).map(|value| KvPair {
                key: key.to_string(),
                value: value.as_bytes().to_vec(),
                flags: 0,
                modify_index: 1,
            }))
        }
    }

    fn test_config(cache_time: std::time::Duration) -> Config {
        Config {
            default_cache_time: cache_time,
            ..Config::default()
        }
    }

    fn accessor(store: &Arc<MemoryKv>, cache_time: std::time::Duration) -> ConfigAccessor {
        ConfigAccessor::with_store(test_config(cache_time), store.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_get_int_cache_then_refetch() {
        let store = MemoryKv::with(&[("limit", "42")]);
        let config = accessor(&store, std::time::Duration::from_secs(1));

        assert_eq!(config.get_int("limit").await.unwrap(), 42);
        assert_eq!(store.fetches(), 1);

        assert_eq!(config.get_int("limit").await.unwrap(), 42);
        assert_eq!(store.fetches(), 1, "Second read should hit the cache");

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        assert_eq!(config.get_int("limit").await.unwrap(), 42);
        assert_eq!(store.fetches(), 2, "Expired entry should be fetched again");
    }

    #[tokio::test]
    async fn test_get_float_and_duration() {
        let store = MemoryKv::with(&[("rate", "0.75"), ("timeout", "250ms")]);
        let config = accessor(&store, std::time::Duration::from_secs(60));

        assert_eq!(config.get_float("rate").await.unwrap(), 0.75);
        assert_eq!(
            config.get_duration("timeout").await.unwrap(),
            Duration::milliseconds(250)
        );
    }

    #[tokio::test]
    async fn test_get_string_absent_key() {
        let store = MemoryKv::with(&[]);
        let config = accessor(&store, std::time::Duration::from_secs(60));

        assert_eq!(config.get_string("missing").await.unwrap(), "");
        assert_eq!(config.get_string("missing").await.unwrap(), "");
        assert_eq!(store.fetches(), 2, "Absent keys are not cached");
    }

    #[tokio::test]
    async fn test_typed_getters_absent_key_is_parse_error() {
        let store = MemoryKv::with(&[]);
        let config = accessor(&store, std::time::Duration::from_secs(60));

        let err = config.get_int("missing").await.unwrap_err();
        assert!(err.is_parse());
        assert_eq!(err.key(), Some("missing"));

        assert!(config.get_float("missing").await.unwrap_err().is_parse());
        assert!(config.get_duration("missing").await.unwrap_err().is_parse());
    }

    #[tokio::test]
    async fn test_bad_int_error_layers() {
        let store = MemoryKv::with(&[("bad", "abc")]);
        let config = accessor(&store, std::time::Duration::from_secs(60));

        let err = config.get_int("bad").await.unwrap_err();
        assert_eq!(err.to_string(), "get int value from consul for key `bad`");

        let AccessorError::Parse { source, .. } = &err else {
            panic!("expected parse error, got {err:?}");
        };
        assert_eq!(source.key, "bad");
        assert_eq!(source.target, ValueType::Int);

        let inner = err.source().unwrap();
        assert_eq!(inner.to_string(), "parse int from consul value of key `bad`");
        assert!(inner.source().is_some(), "Parser error should stay in the chain");
        assert!(!format!("{err:#}").contains("abc"));
    }

    #[tokio::test]
    async fn test_store_failure_is_fetch_error() {
        let store = MemoryKv::with(&[("limit", "42")]);
        store.failing.store(true, Ordering::SeqCst);
        let config = accessor(&store, std::time::Duration::from_secs(60));

        let err = config.get_string("limit").await.unwrap_err();
        assert!(err.is_fetch());
        assert!(matches!(
            err.source().and_then(|e| e.downcast_ref::<StoreError>()),
            Some(StoreError::Status { .. })
        ));

        assert!(config.get_int("limit").await.unwrap_err().is_fetch());
        assert!(config.get_float("limit").await.unwrap_err().is_fetch());
        assert!(config.get_duration("limit").await.unwrap_err().is_fetch());
    }

    #[tokio::test]
    async fn test_cached_value_survives_store_outage() {
        let store = MemoryKv::with(&[("limit", "42")]);
        let config = accessor(&store, std::time::Duration::from_secs(60));

        assert_eq!(config.get_int("limit").await.unwrap(), 42);
        store.failing.store(true, Ordering::SeqCst);
        assert_eq!(config.get_int("limit").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_store_change_visible_after_expiry() {
        let store = MemoryKv::with(&[("flag", "off")]);
        let config = accessor(&store, std::time::Duration::from_millis(200));

        assert_eq!(config.get_string("flag").await.unwrap(), "off");
        store.put("flag", "on");
        assert_eq!(config.get_string("flag").await.unwrap(), "off");

        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        assert_eq!(config.get_string("flag").await.unwrap(), "on");
    }

    #[tokio::test]
    async fn test_cache_and_store_coerce_identically() {
        let store = MemoryKv::with(&[("limit", "-17"), ("window", "1m30s")]);
        let config = accessor(&store, std::time::Duration::from_secs(60));

        let fetched = config.get_int("limit").await.unwrap();
        let cached = config.get_int("limit").await.unwrap();
        assert_eq!(fetched, cached);

        let fetched = config.get_duration("window").await.unwrap();
        let cached = config.get_duration("window").await.unwrap();
        assert_eq!(fetched, cached);
        assert_eq!(cached, Duration::seconds(90));
    }

    #[tokio::test]
    async fn test_get_json() {
        let store = MemoryKv::with(&[("errors", r#"{"E001":{"status":400,"message":"bad input"}}"#)]);
        let config = accessor(&store, std::time::Duration::from_secs(60));

        #[derive(serde::Deserialize)]
        struct ErrorResponse {
            status: u16,
            message: String,
        }

        let codes: HashMap<String, ErrorResponse> = config.get_json("errors").await.unwrap();
        assert_eq!(codes["E001"].status, 400);
        assert_eq!(codes["E001"].message, "bad input");

        let err = config.get_json::<HashMap<String, u16>>("missing").await.unwrap_err();
        assert!(err.is_parse());
    }

    #[tokio::test]
    async fn test_cache_stats() {
        let store = MemoryKv::with(&[("limit", "42")]);
        let config = accessor(&store, std::time::Duration::from_secs(60));

        config.get_int("limit").await.unwrap();
        config.get_int("limit").await.unwrap();
        config.get_string("missing").await.unwrap();

        let stats = config.cache_stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.total_entries, 1);
    }

    #[tokio::test]
    async fn test_clones_share_cache() {
        let store = MemoryKv::with(&[("limit", "42")]);
        let config = accessor(&store, std::time::Duration::from_secs(60));
        let other = config.clone();

        config.get_int("limit").await.unwrap();
        other.get_int("limit").await.unwrap();
        assert_eq!(store.fetches(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_reads_agree() {
        let store = MemoryKv::with(&[("limit", "42")]);
        let config = accessor(&store, std::time::Duration::from_secs(60));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let config = config.clone();
                tokio::spawn(async move { config.get_int("limit").await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        // Concurrent misses may each fetch; no de-duplication is promised.
        assert!((1..=16).contains(&store.fetches()));
    }

    #[tokio::test]
    async fn test_usable_through_trait_object() {
        let store = MemoryKv::with(&[("limit", "42"), ("name", "svc")]);
        let source: Arc<dyn ConfigSource> = Arc::new(accessor(&store, std::time::Duration::from_secs(60)));

        assert_eq!(source.get_int("limit").await.unwrap(), 42);
        assert_eq!(source.get_string("name").await.unwrap(), "svc");
    }

    #[test]
    fn test_construction_without_runtime_fails() {
        let store = MemoryKv::with(&[]);
        let result = ConfigAccessor::with_store(Config::default(), store);

        assert!(matches!(
            result,
            Err(AccessorError::Construction { source: None, .. })
        ));
    }

    #[test]
    fn test_no_cleanup_task_needs_no_runtime() {
        let store = MemoryKv::with(&[("limit", "42")]);
        let config = Config {
            cleanup_interval: std::time::Duration::ZERO,
            ..Config::default()
        };
        let config = ConfigAccessor::with_store(config, store).unwrap();

        let value = tokio_test::block_on(config.get_int("limit")).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_new_rejects_malformed_address() {
        let config = Config {
            cleanup_interval: std::time::Duration::ZERO,
            ..Config::new("http://")
        };
        let err = ConfigAccessor::new(config).err().unwrap();

        assert!(matches!(
            err,
            AccessorError::Construction {
                source: Some(StoreError::InvalidAddress { .. }),
                ..
            }
        ));
    }
}
