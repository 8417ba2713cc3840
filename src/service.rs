//! Composition root: builds the shared pool, registry, gate, dispatcher and
//! fetch path from a [`Config`] once at startup.

use crate::config::Config;
use crate::fetch::paginator::ContentPaginator;
use crate::fetch::WebFetcher;
use crate::search::providers;
use crate::search::{
    ConcurrencyGate, CooldownPolicy, DispatchConfig, Dispatcher, EngineRegistry, SearchProvider,
};
use crate::tool::ToolRegistry;
use crate::transport::ConnectionPool;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

/// Process-wide handle to the search engine core
///
/// Cloning the inner `Arc`s is how consumers share it; nothing here is a
/// global.
pub struct SearchService {
    pool: Arc<ConnectionPool>,
    dispatcher: Arc<Dispatcher>,
    paginator: Arc<ContentPaginator>,
    fetcher: Arc<WebFetcher>,
}

impl SearchService {
    /// Build everything with the built-in HTTP providers
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(ConnectionPool::new(config.pool.clone()));
        let providers = providers::build_all(&pool, &config.engines);
        Self::assemble(config, pool, providers)
    }

    /// Build with a caller-supplied provider set (embedding, tests)
    pub fn with_providers(config: &Config, providers: Vec<Arc<dyn SearchProvider>>) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(ConnectionPool::new(config.pool.clone()));
        Self::assemble(config, pool, providers)
    }

    fn assemble(
        config: &Config,
        pool: Arc<ConnectionPool>,
        providers: Vec<Arc<dyn SearchProvider>>,
    ) -> Result<Self> {
        let policy = CooldownPolicy {
            backoff: config.dispatch.cooldown(),
            error_threshold: config.dispatch.error_threshold,
        };
        let registry = EngineRegistry::new(providers, policy)
            .context("Failed to register search providers")?;

        if registry.available_count() == 0 {
            tracing::warn!("no search engine has a usable credential");
        }

        let gate = Arc::new(ConcurrencyGate::new(config.dispatch.max_concurrent));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(registry),
            gate,
            DispatchConfig::from(&config.dispatch),
        ));

        let paginator = Arc::new(ContentPaginator::new(
            config.fetch.page_max_length,
            Duration::from_secs(config.fetch.page_ttl_secs),
            config.fetch.page_cache_capacity,
        ));
        let fetcher = Arc::new(WebFetcher::new(
            pool.clone(),
            paginator.clone(),
            &config.fetch,
            &config.engines,
        ));

        tracing::info!(
            engines = dispatcher.registry().len(),
            available = dispatcher.registry().available_count(),
            max_concurrent = config.dispatch.max_concurrent,
            "search service ready"
        );

        Ok(Self {
            pool,
            dispatcher,
            paginator,
            fetcher,
        })
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn fetcher(&self) -> &Arc<WebFetcher> {
        &self.fetcher
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn paginator(&self) -> &Arc<ContentPaginator> {
        &self.paginator
    }

    /// Tool registry wired to this service
    pub fn tools(&self) -> ToolRegistry {
        ToolRegistry::from_service(self)
    }

    /// Stop admitting searches, drop pooled connections and cached pages
    ///
    /// In-flight requests finish with the client they already hold.
    pub fn shutdown(&self) {
        self.dispatcher.shutdown();
        self.pool.shutdown();
        self.paginator.clear();
        tracing::info!("search service shut down");
    }
}
