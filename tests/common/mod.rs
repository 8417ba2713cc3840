//! Common test utilities: scripted providers and dispatcher builders
#![allow(dead_code)]

use search_fusion::config::{Config, PoolConfig};
use search_fusion::search::{
    ConcurrencyGate, CooldownPolicy, DispatchConfig, Dispatcher, EngineRegistry, SearchError,
    SearchProvider, SearchResult,
};
use search_fusion::transport::ConnectionPool;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a scripted provider does on one call
#[derive(Debug, Clone)]
pub enum Step {
    /// Return this many results
    Results(usize),
    Empty,
    Network,
    RateLimit,
    Auth,
    /// Never return on its own
    Hang,
}

/// In-memory provider that plays back a queue of steps
///
/// Once the queue is empty every call repeats `fallback`.
pub struct ScriptedProvider {
    name: String,
    priority: u32,
    credential: bool,
    delay: Duration,
    cooldown: Option<Duration>,
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(name: &str, priority: u32) -> Self {
        Self {
            name: name.to_string(),
            priority,
            credential: true,
            delay: Duration::ZERO,
            cooldown: None,
            script: Mutex::new(VecDeque::new()),
            fallback: Step::Results(3),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn without_credential(mut self) -> Self {
        self.credential = false;
        self
    }

    /// Sleep this long (tokio time) before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Own rate-limit cooldown instead of the registry default
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    pub fn with_script(self, steps: Vec<Step>) -> Self {
        *self.script.lock().expect("script lock") = steps.into();
        self
    }

    pub fn always(mut self, step: Step) -> Self {
        self.fallback = step;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait::async_trait]
impl SearchProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn is_available(&self) -> bool {
        self.credential
    }

    fn cooldown(&self) -> Option<Duration> {
        self.cooldown
    }

    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match step {
            Step::Results(n) => Ok((0..n.min(count))
                .map(|i| {
                    SearchResult::new(
                        format!("{} result {i} for {query}", self.name),
                        format!("https://{}.example/{i}", self.name),
                        "snippet",
                    )
                })
                .collect()),
            Step::Empty => Ok(Vec::new()),
            Step::Network => Err(SearchError::ApiError("connection reset".to_string())),
            Step::RateLimit => Err(SearchError::RateLimitExceeded),
            Step::Auth => Err(SearchError::InvalidApiKey),
            Step::Hang => std::future::pending().await,
        }
    }
}

pub fn as_dyn(providers: &[Arc<ScriptedProvider>]) -> Vec<Arc<dyn SearchProvider>> {
    providers
        .iter()
        .map(|p| Arc::clone(p) as Arc<dyn SearchProvider>)
        .collect()
}

pub fn dispatch_config(request_secs: u64, attempt_secs: u64, gate_secs: u64) -> DispatchConfig {
    DispatchConfig {
        request_timeout: Duration::from_secs(request_secs),
        attempt_timeout: Duration::from_secs(attempt_secs),
        gate_timeout: Duration::from_secs(gate_secs),
    }
}

/// Dispatcher over `providers` with a 60s cooldown
pub fn dispatcher(
    providers: &[Arc<ScriptedProvider>],
    capacity: usize,
    config: DispatchConfig,
) -> Dispatcher {
    dispatcher_with_policy(providers, capacity, config, CooldownPolicy::default())
}

pub fn dispatcher_with_policy(
    providers: &[Arc<ScriptedProvider>],
    capacity: usize,
    config: DispatchConfig,
    policy: CooldownPolicy,
) -> Dispatcher {
    let registry = EngineRegistry::new(as_dyn(providers), policy).expect("unique provider names");
    Dispatcher::new(
        Arc::new(registry),
        Arc::new(ConcurrencyGate::new(capacity)),
        config,
    )
}

/// Config with every built-in engine disabled
pub fn offline_config() -> Config {
    let mut config = Config::default();
    for engine in [
        &mut config.engines.google,
        &mut config.engines.serper,
        &mut config.engines.jina,
        &mut config.engines.exa,
        &mut config.engines.duckduckgo,
        &mut config.engines.brave,
        &mut config.engines.bing,
    ] {
        engine.enabled = false;
    }
    config
}

pub fn test_pool() -> Arc<ConnectionPool> {
    Arc::new(ConnectionPool::new(PoolConfig {
        connect_timeout_secs: 2,
        read_timeout_secs: 5,
        ..PoolConfig::default()
    }))
}
