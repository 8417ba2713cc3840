//! Per-provider success/error counters and cooldown timers.
//!
//! Each provider gets its own mutex, so updates for one provider are
//! serialized while different providers never contend. Cooldowns expire
//! lazily: the first read after `cooldown_until` clears it.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// When an error puts a provider into cooldown
#[derive(Debug, Clone)]
pub struct CooldownPolicy {
    /// Cooldown length for providers without their own
    pub backoff: Duration,
    /// Consecutive plain errors that also trigger cooldown; `None` means
    /// only rate-limit signals do
    pub error_threshold: Option<u32>,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(60),
            error_threshold: None,
        }
    }
}

#[derive(Debug, Default)]
struct ProviderHealth {
    success_count: u64,
    error_count: u64,
    consecutive_errors: u32,
    cooldown_until: Option<Instant>,
    credential_rejected: bool,
    last_success_at: Option<DateTime<Utc>>,
    last_error_at: Option<DateTime<Utc>>,
}

/// Consistent copy of one provider's health, taken under its lock
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSnapshot {
    pub success_count: u64,
    pub error_count: u64,
    pub consecutive_errors: u32,
    pub cooldown_until: Option<Instant>,
    /// Provider answered with an auth error; excluded from automatic selection
    pub credential_rejected: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
}

impl HealthSnapshot {
    pub fn is_cooling_down(&self, now: Instant) -> bool {
        matches!(self.cooldown_until, Some(until) if now < until)
    }

    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        self.cooldown_until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }

    /// Fraction of recorded attempts that succeeded, 0.0 when none
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.error_count;
        if total == 0 {
            0.0
        } else {
            self.success_count as f64 / total as f64
        }
    }
}

struct Slot {
    backoff: Option<Duration>,
    health: Mutex<ProviderHealth>,
}

pub struct StatsTracker {
    providers: HashMap<String, Slot>,
    policy: CooldownPolicy,
}

impl StatsTracker {
    /// Track exactly these providers; the set is fixed for the tracker's life
    pub fn new<I, S>(names: I, policy: CooldownPolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_backoffs(names.into_iter().map(|name| (name, None)), policy)
    }

    /// Like [`StatsTracker::new`], with an optional cooldown per provider
    /// overriding `policy.backoff`
    pub fn with_backoffs<I, S>(entries: I, policy: CooldownPolicy) -> Self
    where
        I: IntoIterator<Item = (S, Option<Duration>)>,
        S: Into<String>,
    {
        let providers = entries
            .into_iter()
            .map(|(name, backoff)| {
                let slot = Slot {
                    backoff,
                    health: Mutex::new(ProviderHealth::default()),
                };
                (name.into(), slot)
            })
            .collect();
        Self { providers, policy }
    }

    pub fn policy(&self) -> &CooldownPolicy {
        &self.policy
    }

    /// Cooldown a rate limit puts `provider` into
    pub fn backoff(&self, provider: &str) -> Duration {
        self.providers
            .get(provider)
            .and_then(|slot| slot.backoff)
            .unwrap_or(self.policy.backoff)
    }

    /// Count a success; clears any cooldown and the consecutive-error run
    pub fn record_success(&self, provider: &str) {
        self.with_health(provider, |health| {
            health.success_count += 1;
            health.consecutive_errors = 0;
            health.cooldown_until = None;
            health.last_success_at = Some(Utc::now());
        });
    }

    /// Count an error; rate-limit signals always start a cooldown
    pub fn record_error(&self, provider: &str, is_rate_limit: bool) {
        let policy = &self.policy;
        let backoff = self.backoff(provider);
        let cooled = self.with_health(provider, |health| {
            health.error_count += 1;
            health.consecutive_errors += 1;
            health.last_error_at = Some(Utc::now());

            let threshold_hit = policy
                .error_threshold
                .is_some_and(|n| health.consecutive_errors >= n);

            if is_rate_limit || threshold_hit {
                health.cooldown_until = Some(Instant::now() + backoff);
                health.consecutive_errors = 0;
                true
            } else {
                false
            }
        });

        if cooled == Some(true) {
            tracing::warn!(
                provider = %provider,
                rate_limited = is_rate_limit,
                backoff_secs = backoff.as_secs(),
                "provider entering cooldown"
            );
        }
    }

    /// Count an auth failure; the provider stays out of automatic selection
    /// until restart, no cooldown involved
    pub fn record_auth_failure(&self, provider: &str) {
        let first = self.with_health(provider, |health| {
            health.error_count += 1;
            health.last_error_at = Some(Utc::now());
            !std::mem::replace(&mut health.credential_rejected, true)
        });

        if first == Some(true) {
            tracing::warn!(provider = %provider, "credential rejected, provider disabled");
        }
    }

    /// Consistent view of one provider, `None` for unknown names
    pub fn snapshot(&self, provider: &str) -> Option<HealthSnapshot> {
        self.with_health(provider, |health| {
            if health
                .cooldown_until
                .is_some_and(|until| Instant::now() >= until)
            {
                health.cooldown_until = None;
            }

            HealthSnapshot {
                success_count: health.success_count,
                error_count: health.error_count,
                consecutive_errors: health.consecutive_errors,
                cooldown_until: health.cooldown_until,
                credential_rejected: health.credential_rejected,
                last_success_at: health.last_success_at,
                last_error_at: health.last_error_at,
            }
        })
    }

    pub fn is_cooling_down(&self, provider: &str) -> bool {
        self.snapshot(provider)
            .is_some_and(|s| s.is_cooling_down(Instant::now()))
    }

    fn with_health<R>(&self, provider: &str, f: impl FnOnce(&mut ProviderHealth) -> R) -> Option<R> {
        let Some(slot) = self.providers.get(provider) else {
            tracing::debug!(provider = %provider, "stats update for unregistered provider ignored");
            return None;
        };
        // Every critical section leaves the struct consistent, so a poisoned
        // lock still holds usable data.
        let mut health = slot.health.lock().unwrap_or_else(PoisonError::into_inner);
        Some(f(&mut health))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn tracker(policy: CooldownPolicy) -> StatsTracker {
        StatsTracker::new(["a", "b"], policy)
    }

    #[test]
    fn counters_start_at_zero() {
        let stats = tracker(CooldownPolicy::default());
        let snap = stats.snapshot("a").unwrap();
        assert_eq!(snap.success_count, 0);
        assert_eq!(snap.error_count, 0);
        assert!(snap.cooldown_until.is_none());
        assert_eq!(snap.success_rate(), 0.0);
    }

    #[test]
    fn unknown_provider_is_ignored() {
        let stats = tracker(CooldownPolicy::default());
        stats.record_success("zzz");
        stats.record_error("zzz", true);
        assert!(stats.snapshot("zzz").is_none());
        assert!(!stats.is_cooling_down("zzz"));
    }

    #[tokio::test]
    async fn plain_error_does_not_cool_down_by_default() {
        let stats = tracker(CooldownPolicy::default());
        for _ in 0..10 {
            stats.record_error("a", false);
        }
        let snap = stats.snapshot("a").unwrap();
        assert_eq!(snap.error_count, 10);
        assert!(!stats.is_cooling_down("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_cooldown_expires_at_backoff() {
        let stats = tracker(CooldownPolicy {
            backoff: Duration::from_secs(60),
            error_threshold: None,
        });

        stats.record_error("a", true);
        assert!(stats.is_cooling_down("a"));
        assert!(!stats.is_cooling_down("b"));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(stats.is_cooling_down("a"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!stats.is_cooling_down("a"));
        assert!(stats.snapshot("a").unwrap().cooldown_until.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn error_threshold_triggers_cooldown() {
        let stats = tracker(CooldownPolicy {
            backoff: Duration::from_secs(30),
            error_threshold: Some(3),
        });

        stats.record_error("a", false);
        stats.record_error("a", false);
        assert!(!stats.is_cooling_down("a"));

        stats.record_error("a", false);
        assert!(stats.is_cooling_down("a"));
        assert_eq!(stats.snapshot("a").unwrap().consecutive_errors, 0);
    }

    #[tokio::test]
    async fn success_resets_error_run_and_cooldown() {
        let stats = tracker(CooldownPolicy {
            backoff: Duration::from_secs(30),
            error_threshold: Some(2),
        });

        stats.record_error("a", false);
        stats.record_success("a");
        stats.record_error("a", false);
        assert!(!stats.is_cooling_down("a"));

        stats.record_error("a", true);
        assert!(stats.is_cooling_down("a"));
        stats.record_success("a");
        assert!(!stats.is_cooling_down("a"));

        let snap = stats.snapshot("a").unwrap();
        assert_eq!(snap.success_count, 2);
        assert_eq!(snap.error_count, 3);
        assert!(snap.last_success_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn provider_backoff_overrides_policy() {
        let stats = StatsTracker::with_backoffs(
            [("a", Some(Duration::from_secs(120))), ("b", None)],
            CooldownPolicy::default(),
        );
        assert_eq!(stats.backoff("a"), Duration::from_secs(120));
        assert_eq!(stats.backoff("b"), Duration::from_secs(60));
        assert_eq!(stats.backoff("zzz"), Duration::from_secs(60));

        stats.record_error("a", true);
        stats.record_error("b", true);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(stats.is_cooling_down("a"));
        assert!(!stats.is_cooling_down("b"));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!stats.is_cooling_down("a"));
    }

    #[test]
    fn auth_failure_marks_rejected_without_cooldown() {
        let stats = tracker(CooldownPolicy::default());
        stats.record_auth_failure("b");
        stats.record_auth_failure("b");

        let snap = stats.snapshot("b").unwrap();
        assert!(snap.credential_rejected);
        assert_eq!(snap.error_count, 2);
        assert!(snap.cooldown_until.is_none());
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let stats = Arc::new(tracker(CooldownPolicy::default()));
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        if i % 2 == 0 {
                            stats.record_success("a");
                        } else {
                            stats.record_error("a", false);
                        }
                        stats.record_success("b");
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }

        let a = stats.snapshot("a").unwrap();
        assert_eq!(a.success_count + a.error_count, 4000);
        assert_eq!(a.success_count, 2000);
        assert_eq!(stats.snapshot("b").unwrap().success_count, 4000);
    }
}
