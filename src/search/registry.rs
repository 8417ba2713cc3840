use super::stats::{CooldownPolicy, StatsTracker};
use super::{ProviderPreference, SearchProvider};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;

/// Static facts about a registered provider, fixed at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub priority: u32,
    pub requires_credential: bool,
    pub credential_present: bool,
}

impl ProviderDescriptor {
    /// A provider missing a required credential can never be used
    pub fn has_usable_credential(&self) -> bool {
        !self.requires_credential || self.credential_present
    }
}

#[derive(Clone)]
pub struct Candidate {
    pub descriptor: ProviderDescriptor,
    pub provider: Arc<dyn SearchProvider>,
}

/// Row of [`EngineRegistry::statuses`]
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub name: String,
    pub priority: u32,
    pub available: bool,
    pub requires_credential: bool,
    pub credential_present: bool,
    pub credential_rejected: bool,
    pub success_count: u64,
    pub error_count: u64,
    pub success_rate: f64,
    /// Cooldown a rate limit would start
    pub cooldown_secs: u64,
    pub cooling_down: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_secs: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate provider name: {0}")]
    DuplicateName(String),
}

/// Registered providers plus their health
///
/// Registration order is kept so equal priorities resolve the same way on
/// every call.
pub struct EngineRegistry {
    entries: Vec<Candidate>,
    stats: StatsTracker,
}

impl EngineRegistry {
    pub fn new(
        providers: Vec<Arc<dyn SearchProvider>>,
        policy: CooldownPolicy,
    ) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(providers.len());
        let mut backoffs = Vec::with_capacity(providers.len());

        for provider in providers {
            let name = provider.name().to_lowercase();
            if !seen.insert(name.clone()) {
                return Err(RegistryError::DuplicateName(name));
            }

            let descriptor = ProviderDescriptor {
                name,
                priority: provider.priority(),
                requires_credential: provider.requires_credential(),
                credential_present: provider.is_available(),
            };

            tracing::debug!(
                provider = %descriptor.name,
                priority = descriptor.priority,
                credential_present = descriptor.credential_present,
                "provider registered"
            );

            backoffs.push((descriptor.name.clone(), provider.cooldown()));
            entries.push(Candidate {
                descriptor,
                provider,
            });
        }

        let stats = StatsTracker::with_backoffs(backoffs, policy);
        Ok(Self { entries, stats })
    }

    pub fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Case-insensitive lookup by name
    pub fn find(&self, name: &str) -> Option<&Candidate> {
        let wanted = name.trim();
        self.entries
            .iter()
            .find(|c| c.descriptor.name.eq_ignore_ascii_case(wanted))
    }

    /// Descriptors in registration order
    pub fn descriptors(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.entries.iter().map(|c| &c.descriptor)
    }

    /// Providers to try for `preference`, in order
    ///
    /// A named provider is returned alone even while cooling down. In auto
    /// mode providers lacking a credential, with a rejected credential, or
    /// in cooldown are left out and the rest are sorted by priority.
    pub fn eligible_order(&self, preference: &ProviderPreference) -> Vec<Candidate> {
        match preference {
            ProviderPreference::Named(name) => self.find(name).cloned().into_iter().collect(),
            ProviderPreference::Auto => {
                let now = Instant::now();
                let mut eligible: Vec<Candidate> = self
                    .entries
                    .iter()
                    .filter(|c| self.is_eligible(&c.descriptor, now))
                    .cloned()
                    .collect();
                // stable: ties keep registration order
                eligible.sort_by_key(|c| c.descriptor.priority);
                eligible
            }
        }
    }

    fn is_eligible(&self, descriptor: &ProviderDescriptor, now: Instant) -> bool {
        if !descriptor.has_usable_credential() {
            return false;
        }
        match self.stats.snapshot(&descriptor.name) {
            Some(health) => !health.credential_rejected && !health.is_cooling_down(now),
            None => false,
        }
    }

    /// Health of every provider, in priority order
    pub fn statuses(&self) -> Vec<EngineStatus> {
        let now = Instant::now();
        let mut statuses: Vec<EngineStatus> = self
            .entries
            .iter()
            .filter_map(|c| {
                let d = &c.descriptor;
                let health = self.stats.snapshot(&d.name)?;
                let cooling_down = health.is_cooling_down(now);
                Some(EngineStatus {
                    name: d.name.clone(),
                    priority: d.priority,
                    available: d.has_usable_credential()
                        && !health.credential_rejected
                        && !cooling_down,
                    requires_credential: d.requires_credential,
                    credential_present: d.credential_present,
                    credential_rejected: health.credential_rejected,
                    success_count: health.success_count,
                    error_count: health.error_count,
                    success_rate: health.success_rate(),
                    cooldown_secs: self.stats.backoff(&d.name).as_secs(),
                    cooling_down,
                    cooldown_remaining_secs: health
                        .cooldown_remaining(now)
                        .map(|d| d.as_secs_f64().ceil() as u64),
                })
            })
            .collect();
        statuses.sort_by_key(|s| s.priority);
        statuses
    }

    pub fn available_count(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|c| self.is_eligible(&c.descriptor, now))
            .count()
    }
}
