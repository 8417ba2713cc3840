//! Adapter for search backends whose client call blocks.
//!
//! The blocking call runs on tokio's blocking thread pool so it never
//! stalls the async workers; an optional worker limit bounds how many such
//! calls run at once.

use super::{SearchError, SearchProvider, SearchResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

type BlockingSearchFn = dyn Fn(&str, usize) -> Result<Vec<SearchResult>, SearchError> + Send + Sync;

pub struct BlockingProvider {
    name: String,
    priority: u32,
    requires_credential: bool,
    credential_present: bool,
    cooldown: Option<Duration>,
    search_fn: Arc<BlockingSearchFn>,
    workers: Option<Arc<Semaphore>>,
}

impl BlockingProvider {
    pub fn new<F>(name: impl Into<String>, priority: u32, search_fn: F) -> Self
    where
        F: Fn(&str, usize) -> Result<Vec<SearchResult>, SearchError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            priority,
            requires_credential: false,
            credential_present: true,
            cooldown: None,
            search_fn: Arc::new(search_fn),
            workers: None,
        }
    }

    /// Mark the backend as keyed; `present` is whether the key exists
    pub fn with_credential(mut self, present: bool) -> Self {
        self.requires_credential = true;
        self.credential_present = present;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    /// Allow at most `max` blocking calls at once for this provider
    pub fn with_workers(mut self, max: usize) -> Self {
        self.workers = Some(Arc::new(Semaphore::new(max.max(1))));
        self
    }
}

#[async_trait::async_trait]
impl SearchProvider for BlockingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn requires_credential(&self) -> bool {
        self.requires_credential
    }

    fn is_available(&self) -> bool {
        self.credential_present
    }

    fn cooldown(&self) -> Option<Duration> {
        self.cooldown
    }

    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>, SearchError> {
        let worker = match &self.workers {
            Some(workers) => Some(
                Arc::clone(workers)
                    .acquire_owned()
                    .await
                    .map_err(|e| SearchError::Other(anyhow::anyhow!("worker pool closed: {e}")))?,
            ),
            None => None,
        };

        let search_fn = Arc::clone(&self.search_fn);
        let query = query.to_string();

        tracing::trace!(provider = %self.name, "running blocking search");

        // The worker slot moves into the closure so it is held for the
        // blocking call itself, even if this future is dropped.
        tokio::task::spawn_blocking(move || {
            let _worker = worker;
            search_fn(&query, count)
        })
        .await
        .map_err(|e| SearchError::Other(anyhow::anyhow!("blocking search task failed: {e}")))?
    }
}
