//! Consul KV client over the agent HTTP API.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::StoreError;
use crate::store::{KvPair, KvStore};

/// Pair as listed by `GET /v1/kv/{key}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiKvPair {
    key: String,
    /// Base64, null when the key exists without a value
    value: Option<String>,
    #[serde(default)]
    flags: u64,
    #[serde(default)]
    modify_index: u64,
}

impl ApiKvPair {
    fn into_pair(self) -> Result<KvPair, StoreError> {
        let value = match self.value {
            Some(encoded) => STANDARD
                .decode(encoded.as_bytes())
                .map_err(|source| StoreError::Value {
                    key: self.key.clone(),
                    source,
                })?,
            None => Vec::new(),
        };

        Ok(KvPair {
            key: self.key,
            value,
            flags: self.flags,
            modify_index: self.modify_index,
        })
    }
}

// == Consul KV ==
/// HTTP client for the Consul KV endpoint.
pub struct ConsulKv {
    client: Client,
    base_url: Url,
    /// Caps in-flight requests at `max_conns`, None = unlimited
    limiter: Option<Semaphore>,
}

impl ConsulKv {
    /// Builds a client from the connection settings in `config`.
    pub fn new(config: &Config) -> Result<Self, StoreError> {
        let base_url = base_url(&config.address)?;

        let mut builder = Client::builder()
            .danger_accept_invalid_certs(config.insecure_skip_verify);
        if !config.timeout.is_zero() {
            builder = builder.timeout(config.timeout);
        }
        if config.max_conns > 0 {
            builder = builder.pool_max_idle_per_host(config.max_conns);
        }
        let client = builder.build().map_err(StoreError::Client)?;

        info!(
            address = %base_url,
            max_conns = config.max_conns,
            timeout_ms = config.timeout.as_millis() as u64,
            insecure_skip_verify = config.insecure_skip_verify,
            "Consul client created"
        );

        Ok(Self {
            client,
            base_url,
            limiter: (config.max_conns > 0).then(|| Semaphore::new(config.max_conns)),
        })
    }

    /// Base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn key_url(&self, key: &str) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidAddress {
                address: self.base_url.to_string(),
                reason: "address cannot hold a path".to_string(),
            })?
            .pop_if_empty()
            .extend(["v1", "kv"])
            .extend(key.trim_start_matches('/').split('/'));
        Ok(url)
    }
}

#[async_trait]
impl KvStore for ConsulKv {
    async fn get(&self, key: &str) -> Result<Option<KvPair>, StoreError> {
        let url = self.key_url(key)?;

        let _permit = match &self.limiter {
            Some(limiter) => limiter.acquire().await.ok(),
            None => None,
        };

        debug!(key, "Fetching key from consul");
        let response = self.client.get(url).send().await?;

        match response.status() {
            StatusCode::OK => {
                let body = response.bytes().await?;
                let pairs: Vec<ApiKvPair> = serde_json::from_slice(&body)?;
                pairs.into_iter().next().map(ApiKvPair::into_pair).transpose()
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::Status { status, body })
            }
        }
    }
}

/// Turns `host:port`, `http://host:port` or `https://host:port` into a URL.
fn base_url(address: &str) -> Result<Url, StoreError> {
    let invalid = |reason: &str| StoreError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let address = address.trim();
    if address.is_empty() {
        return Err(invalid("empty address"));
    }

    let with_scheme = if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else if address.contains("://") {
        return Err(invalid("unsupported scheme"));
    } else {
        format!("http://{address}")
    };

    let url = Url::parse(&with_scheme).map_err(|e| invalid(&e.to_string()))?;
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(url)
}
