//! Shared HTTP transport for every provider and the fetch path.
//!
//! One [`ConnectionPool`] owns one `reqwest::Client` (and therefore one
//! keep-alive connection set). The client is built on first use; the
//! number of requests holding a connection at once is bounded by a slot
//! semaphore so a burst of searches cannot open unbounded sockets.

use crate::config::PoolConfig;
use crate::logging::redact_secrets;
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OnceCell, OwnedSemaphorePermit, Semaphore};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("no free connection after {0:?}")]
    PoolTimeout(Duration),

    #[error("connection pool is shut down")]
    Closed,

    #[error("request failed: {}", redact_secrets(&.0.to_string()))]
    Request(#[from] reqwest::Error),
}

enum ClientState {
    Idle,
    Ready(reqwest::Client),
    Closed,
}

pub struct ConnectionPool {
    state: Mutex<ClientState>,
    slots: Arc<Semaphore>,
    config: PoolConfig,
}

static SHARED: OnceCell<Arc<ConnectionPool>> = OnceCell::const_new();

impl ConnectionPool {
    /// Create a pool; the underlying client is built lazily on first request
    pub fn new(config: PoolConfig) -> Self {
        Self {
            state: Mutex::new(ClientState::Idle),
            slots: Arc::new(Semaphore::new(config.max_connections)),
            config,
        }
    }

    /// Process-wide pool, created once by whichever caller gets here first
    ///
    /// Later calls return the same pool and ignore `config`.
    pub async fn shared(config: &PoolConfig) -> Result<Arc<ConnectionPool>, TransportError> {
        SHARED
            .get_or_try_init(|| async {
                let pool = ConnectionPool::new(config.clone());
                pool.client()?;
                tracing::debug!(
                    max_connections = config.max_connections,
                    "shared connection pool created"
                );
                Ok::<_, TransportError>(Arc::new(pool))
            })
            .await
            .map(Arc::clone)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Handle to the shared client, building it on first use
    pub fn client(&self) -> Result<reqwest::Client, TransportError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            ClientState::Ready(client) => Ok(client.clone()),
            ClientState::Closed => Err(TransportError::Closed),
            ClientState::Idle => {
                let client = build_client(&self.config)?;
                *state = ClientState::Ready(client.clone());
                Ok(client)
            }
        }
    }

    /// Send a request built from [`client`](Self::client), holding a
    /// connection slot until the response body has been read
    pub async fn execute(&self, request: RequestBuilder) -> Result<PooledResponse, TransportError> {
        let wait = Duration::from_secs(self.config.pool_timeout_secs);
        let slot = match tokio::time::timeout(wait, Arc::clone(&self.slots).acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(TransportError::Closed),
            Err(_) => {
                tracing::warn!(waited_ms = wait.as_millis() as u64, "connection pool exhausted");
                return Err(TransportError::PoolTimeout(wait));
            }
        };

        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let response = request.send().await?;
        Ok(PooledResponse {
            inner: response,
            _slot: slot,
        })
    }

    /// Requests currently holding a connection slot
    pub fn in_use(&self) -> usize {
        self.config.max_connections - self.slots.available_permits()
    }

    pub fn is_closed(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(*state, ClientState::Closed)
    }

    /// Stop admitting requests and drop the client so idle connections close
    ///
    /// Requests already in flight keep their own client handle and finish.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, ClientState::Closed) {
            return;
        }
        *state = ClientState::Closed;
        self.slots.close();
        tracing::info!("connection pool shut down");
    }
}

fn build_client(config: &PoolConfig) -> Result<reqwest::Client, TransportError> {
    let user_agent = config
        .user_agent
        .clone()
        .unwrap_or_else(|| format!("search-fusion/{}", env!("CARGO_PKG_VERSION")));

    let read = Duration::from_secs(config.read_timeout_secs);
    let write = Duration::from_secs(config.write_timeout_secs);
    let connect = Duration::from_secs(config.connect_timeout_secs);

    let mut builder = reqwest::Client::builder()
        .user_agent(user_agent)
        .pool_max_idle_per_host(config.max_idle_per_host)
        .pool_idle_timeout(Duration::from_secs(config.keepalive_secs))
        .tcp_keepalive(Duration::from_secs(config.keepalive_secs))
        .connect_timeout(connect)
        .read_timeout(read)
        // reqwest has no separate write timeout; bound the whole exchange instead
        .timeout(connect + write + read);

    if let Some(proxy) = &config.http_proxy {
        builder = builder.proxy(reqwest::Proxy::http(proxy).map_err(TransportError::Build)?);
    }
    if let Some(proxy) = &config.https_proxy {
        builder = builder.proxy(reqwest::Proxy::https(proxy).map_err(TransportError::Build)?);
    }

    builder.build().map_err(TransportError::Build)
}

/// Response that keeps its connection slot until the body is consumed
pub struct PooledResponse {
    inner: reqwest::Response,
    _slot: OwnedSemaphorePermit,
}

impl PooledResponse {
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub async fn text(self) -> Result<String, TransportError> {
        Ok(self.inner.text().await?)
    }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T, TransportError> {
        Ok(self.inner.json::<T>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_is_built_once() {
        let pool = ConnectionPool::new(PoolConfig::default());
        assert!(!pool.is_closed());
        pool.client().unwrap();
        pool.client().unwrap();
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn shutdown_rejects_new_clients() {
        let pool = ConnectionPool::new(PoolConfig::default());
        pool.client().unwrap();
        pool.shutdown();
        pool.shutdown();
        assert!(pool.is_closed());
        assert!(matches!(pool.client(), Err(TransportError::Closed)));
    }

    #[test]
    fn invalid_proxy_is_a_build_error() {
        let config = PoolConfig {
            https_proxy: Some("not a proxy url".to_string()),
            ..Default::default()
        };
        let pool = ConnectionPool::new(config);
        assert!(matches!(pool.client(), Err(TransportError::Build(_))));
    }

    #[tokio::test]
    async fn shared_pool_is_created_once() {
        let config = PoolConfig::default();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let config = config.clone();
                tokio::spawn(async move { ConnectionPool::shared(&config).await.unwrap() })
            })
            .collect();

        let mut pools = Vec::new();
        for handle in handles {
            pools.push(handle.await.unwrap());
        }
        assert!(pools.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
