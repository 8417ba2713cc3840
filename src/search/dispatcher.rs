//! Failover controller for one logical search request.
//!
//! ```text
//! Selecting -> Attempting -> Succeeded
//!                  |
//!                  v
//!              Advancing -> Attempting (next candidate)
//!                  |
//!                  v
//!              Exhausted
//! ```
//!
//! Attempts are strictly sequential. Every attempt holds a
//! [`ConcurrencyGate`] slot only while its provider call runs, and the
//! whole request is bounded by one wall-clock budget.

use super::gate::{ConcurrencyGate, GateError};
use super::registry::{Candidate, EngineRegistry, EngineStatus};
use super::{
    AttemptOutcome, ErrorKind, ProviderPreference, SearchAttemptResult, SearchError, SearchRequest,
};
use crate::config::DispatchSettings;
use crate::logging::redact_secrets;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Budget for the whole request, across every attempt
    pub request_timeout: Duration,
    /// Upper bound for one provider attempt
    pub attempt_timeout: Duration,
    /// Longest wait for a concurrency slot
    pub gate_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::from(&DispatchSettings::default())
    }
}

impl From<&DispatchSettings> for DispatchConfig {
    fn from(settings: &DispatchSettings) -> Self {
        Self {
            request_timeout: settings.request_timeout(),
            attempt_timeout: settings.attempt_timeout(),
            gate_timeout: settings.gate_timeout(),
        }
    }
}

/// Why one attempt did not produce results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Credential missing; the provider was not called
    CredentialMissing,
    /// Provider rejected the credential
    Auth,
    RateLimited,
    NoResults,
    Provider(String),
    /// The attempt hit its own timeout
    Timeout,
    /// The request budget ran out during this attempt
    GlobalTimeout,
}

impl FailureReason {
    pub fn outcome(&self) -> AttemptOutcome {
        match self {
            FailureReason::Timeout | FailureReason::GlobalTimeout => AttemptOutcome::Timeout,
            _ => AttemptOutcome::ProviderError,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::CredentialMissing => f.write_str("credential missing"),
            FailureReason::Auth => f.write_str("credential rejected"),
            FailureReason::RateLimited => f.write_str("rate limited"),
            FailureReason::NoResults => f.write_str("no results"),
            FailureReason::Provider(msg) => f.write_str(msg),
            FailureReason::Timeout => f.write_str("timed out"),
            FailureReason::GlobalTimeout => f.write_str("cut off by request timeout"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptFailure {
    pub provider: String,
    pub reason: FailureReason,
    pub latency_ms: u64,
}

fn summarize(attempts: &[AttemptFailure]) -> String {
    if attempts.is_empty() {
        return "no engine attempted".to_string();
    }
    attempts
        .iter()
        .map(|a| format!("{} ({})", a.provider, a.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Terminal failure of a search request
///
/// Every variant that can follow provider attempts carries them in order.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("search query must not be empty")]
    EmptyQuery,

    #[error("unknown search engine: {0}")]
    UnknownProvider(String),

    #[error("no search engine is currently available")]
    NoEligibleProviders,

    #[error("too many concurrent searches, no slot free after {waited:?}")]
    ConcurrencyLimitExceeded {
        waited: Duration,
        attempts: Vec<AttemptFailure>,
    },

    #[error("search timed out after {budget:?}: {}", summarize(.attempts))]
    GlobalTimeoutExceeded {
        budget: Duration,
        attempts: Vec<AttemptFailure>,
    },

    #[error("all search engines failed: {}", summarize(.attempts))]
    Exhausted { attempts: Vec<AttemptFailure> },

    #[error("search dispatcher is shut down")]
    ShutDown,
}

impl DispatchError {
    /// Attempts made before the failure, in order
    pub fn attempts(&self) -> &[AttemptFailure] {
        match self {
            DispatchError::ConcurrencyLimitExceeded { attempts, .. }
            | DispatchError::GlobalTimeoutExceeded { attempts, .. }
            | DispatchError::Exhausted { attempts } => attempts,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchStats {
    pub total_engines: usize,
    pub available_engines: usize,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub success_rate: f64,
    pub last_used_engine: Option<String>,
    pub last_dispatch_at: Option<DateTime<Utc>>,
}

enum State {
    Selecting,
    Attempting(usize),
    Advancing(usize),
    Succeeded(SearchAttemptResult),
    Exhausted,
}

/// Either the attempt produced results or failover should go on
enum Step {
    Done(SearchAttemptResult),
    Failed,
}

pub struct Dispatcher {
    registry: Arc<EngineRegistry>,
    gate: Arc<ConcurrencyGate>,
    config: DispatchConfig,
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    last_dispatch: Mutex<Option<(String, DateTime<Utc>)>>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<EngineRegistry>,
        gate: Arc<ConcurrencyGate>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            registry,
            gate,
            config,
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            last_dispatch: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    pub fn gate(&self) -> &Arc<ConcurrencyGate> {
        &self.gate
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Shorthand for [`dispatch`](Self::dispatch) with a raw preference string
    pub async fn search(
        &self,
        query: &str,
        count: usize,
        preference: &str,
    ) -> Result<SearchAttemptResult, DispatchError> {
        let request =
            SearchRequest::new(query, count).with_preference(ProviderPreference::parse(preference));
        self.dispatch(request).await
    }

    /// Run one search request through failover
    pub async fn dispatch(&self, request: SearchRequest) -> Result<SearchAttemptResult, DispatchError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(DispatchError::EmptyQuery);
        }
        if self.gate.is_closed() {
            return Err(DispatchError::ShutDown);
        }

        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let count = request.count.max(1);
        let explicit = request.preference.is_explicit();
        let deadline = Instant::now() + self.config.request_timeout;

        tracing::debug!(
            query = %query,
            count,
            preference = %request.preference,
            "dispatching search"
        );

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut attempts: Vec<AttemptFailure> = Vec::new();
        let mut state = State::Selecting;

        loop {
            state = match state {
                State::Selecting => {
                    candidates = self.select(&request.preference)?;
                    State::Attempting(0)
                }
                State::Attempting(index) => {
                    match self
                        .attempt(&candidates[index], query, count, deadline, &mut attempts)
                        .await?
                    {
                        Step::Done(result) => State::Succeeded(result),
                        Step::Failed => State::Advancing(index),
                    }
                }
                State::Advancing(index) => {
                    let next = index + 1;
                    if explicit || next >= candidates.len() {
                        State::Exhausted
                    } else if Instant::now() >= deadline {
                        return Err(DispatchError::GlobalTimeoutExceeded {
                            budget: self.config.request_timeout,
                            attempts,
                        });
                    } else {
                        State::Attempting(next)
                    }
                }
                State::Succeeded(result) => {
                    self.successful_requests.fetch_add(1, Ordering::Relaxed);
                    let mut last = self
                        .last_dispatch
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    *last = Some((result.provider.clone(), Utc::now()));
                    return Ok(result);
                }
                State::Exhausted => {
                    tracing::warn!(
                        attempted = attempts.len(),
                        explicit,
                        "search failed on every candidate"
                    );
                    return Err(DispatchError::Exhausted { attempts });
                }
            };
        }
    }

    fn select(&self, preference: &ProviderPreference) -> Result<Vec<Candidate>, DispatchError> {
        let candidates = self.registry.eligible_order(preference);
        if candidates.is_empty() {
            return Err(match preference {
                ProviderPreference::Named(name) => DispatchError::UnknownProvider(name.clone()),
                ProviderPreference::Auto => DispatchError::NoEligibleProviders,
            });
        }
        Ok(candidates)
    }

    async fn attempt(
        &self,
        candidate: &Candidate,
        query: &str,
        count: usize,
        deadline: Instant,
        attempts: &mut Vec<AttemptFailure>,
    ) -> Result<Step, DispatchError> {
        let name = candidate.descriptor.name.as_str();

        if !candidate.descriptor.has_usable_credential() {
            tracing::debug!(provider = %name, "skipping provider without credential");
            attempts.push(AttemptFailure {
                provider: name.to_string(),
                reason: FailureReason::CredentialMissing,
                latency_ms: 0,
            });
            return Ok(Step::Failed);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let budget_binds = remaining <= self.config.gate_timeout;
        let wait = remaining.min(self.config.gate_timeout);

        let permit = match self.gate.acquire(wait).await {
            Ok(permit) => permit,
            Err(GateError::Timeout(waited)) if budget_binds => {
                tracing::warn!(provider = %name, waited_ms = waited.as_millis() as u64, "request budget spent waiting for a slot");
                return Err(DispatchError::GlobalTimeoutExceeded {
                    budget: self.config.request_timeout,
                    attempts: std::mem::take(attempts),
                });
            }
            Err(GateError::Timeout(waited)) => {
                tracing::warn!(provider = %name, waited_ms = waited.as_millis() as u64, "concurrency limit exceeded");
                return Err(DispatchError::ConcurrencyLimitExceeded {
                    waited,
                    attempts: std::mem::take(attempts),
                });
            }
            Err(GateError::Closed) => return Err(DispatchError::ShutDown),
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        let cut_by_budget = remaining <= self.config.attempt_timeout;
        let limit = remaining.min(self.config.attempt_timeout);

        let started = Instant::now();
        let outcome = tokio::time::timeout(limit, candidate.provider.search(query, count)).await;
        let latency = started.elapsed();
        self.gate.release(permit);

        let stats = self.registry.stats();
        let reason = match outcome {
            Ok(Ok(items)) if items.is_empty() => {
                stats.record_error(name, false);
                FailureReason::NoResults
            }
            Ok(Ok(mut items)) => {
                items.truncate(count);
                stats.record_success(name);
                tracing::info!(
                    provider = %name,
                    results = items.len(),
                    latency_ms = latency.as_millis() as u64,
                    "search succeeded"
                );
                return Ok(Step::Done(SearchAttemptResult {
                    provider: name.to_string(),
                    items,
                    outcome: AttemptOutcome::Success,
                    latency,
                }));
            }
            Ok(Err(error)) => classify_failure(self.registry.as_ref(), name, &error),
            Err(_) if cut_by_budget => {
                tracing::warn!(provider = %name, latency_ms = latency.as_millis() as u64, "request budget ran out mid-attempt");
                attempts.push(AttemptFailure {
                    provider: name.to_string(),
                    reason: FailureReason::GlobalTimeout,
                    latency_ms: latency.as_millis() as u64,
                });
                return Err(DispatchError::GlobalTimeoutExceeded {
                    budget: self.config.request_timeout,
                    attempts: std::mem::take(attempts),
                });
            }
            Err(_) => {
                stats.record_error(name, false);
                FailureReason::Timeout
            }
        };

        tracing::warn!(
            provider = %name,
            reason = %reason,
            latency_ms = latency.as_millis() as u64,
            "search attempt failed"
        );
        attempts.push(AttemptFailure {
            provider: name.to_string(),
            reason,
            latency_ms: latency.as_millis() as u64,
        });
        Ok(Step::Failed)
    }

    /// Health of every provider, in priority order
    pub fn engine_statuses(&self) -> Vec<EngineStatus> {
        self.registry.statuses()
    }

    pub fn stats(&self) -> DispatchStats {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let successful_requests = self.successful_requests.load(Ordering::Relaxed);
        let last = self
            .last_dispatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        DispatchStats {
            total_engines: self.registry.len(),
            available_engines: self.registry.available_count(),
            total_requests,
            successful_requests,
            success_rate: if total_requests == 0 {
                0.0
            } else {
                successful_requests as f64 / total_requests as f64
            },
            last_used_engine: last.as_ref().map(|(name, _)| name.clone()),
            last_dispatch_at: last.map(|(_, at)| at),
        }
    }

    /// Refuse new requests; in-flight attempts finish normally
    pub fn shutdown(&self) {
        self.gate.close();
    }
}

/// Record a provider error and map it to a failure reason
fn classify_failure(registry: &EngineRegistry, name: &str, error: &SearchError) -> FailureReason {
    let stats = registry.stats();
    match (error, error.kind()) {
        (_, ErrorKind::Auth) => {
            stats.record_auth_failure(name);
            FailureReason::Auth
        }
        (_, ErrorKind::RateLimit) => {
            stats.record_error(name, true);
            FailureReason::RateLimited
        }
        (_, ErrorKind::Timeout) => {
            stats.record_error(name, false);
            FailureReason::Timeout
        }
        (SearchError::NoResults, _) => {
            stats.record_error(name, false);
            FailureReason::NoResults
        }
        (_, ErrorKind::Network) => {
            stats.record_error(name, false);
            FailureReason::Provider(redact_secrets(&error.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_summary_lists_attempts_in_order() {
        let err = DispatchError::Exhausted {
            attempts: vec![
                AttemptFailure {
                    provider: "google".into(),
                    reason: FailureReason::RateLimited,
                    latency_ms: 12,
                },
                AttemptFailure {
                    provider: "serper".into(),
                    reason: FailureReason::Provider("HTTP 500".into()),
                    latency_ms: 40,
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "all search engines failed: google (rate limited), serper (HTTP 500)"
        );
        assert_eq!(err.attempts().len(), 2);
    }

    #[test]
    fn failure_reason_outcomes() {
        assert_eq!(FailureReason::Timeout.outcome(), AttemptOutcome::Timeout);
        assert_eq!(FailureReason::GlobalTimeout.outcome(), AttemptOutcome::Timeout);
        assert_eq!(FailureReason::Auth.outcome(), AttemptOutcome::ProviderError);
    }

    #[test]
    fn failure_reason_serializes_tagged() {
        let json = serde_json::to_value(FailureReason::Provider("boom".into())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "provider", "detail": "boom"}));
        let json = serde_json::to_value(FailureReason::NoResults).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "no_results"}));
    }
}
