use crate::config::BackoffPolicy;
use crate::routing::backend::{BackendDescriptor, BackendId};
use crate::routing::sampler::WeightedSampler;
use crate::types::{ProxyError, Result};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Weighted selection with quarantine over the backends serving one routing
/// key.
///
/// Quarantine and failure counters live behind a single lock and are never
/// persisted. Concurrent requests may interleave freezes on the same backend;
/// that only stretches the backoff.
pub struct FailoverSelector {
    backends: Vec<BackendDescriptor>,
    sampler: WeightedSampler,
    backoff: BackoffPolicy,
    state: Mutex<SelectorState>,
}

struct SelectorState {
    frozen_until: HashMap<BackendId, Instant>,
    failures: HashMap<BackendId, u32>,
    rng: StdRng,
}

impl SelectorState {
    fn on_hold(&self, id: &BackendId, now: Instant) -> bool {
        state_on_hold(&self.frozen_until, id, now)
    }
}

impl fmt::Debug for FailoverSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backends: Vec<String> = self.backends.iter().map(ToString::to_string).collect();
        f.debug_struct("FailoverSelector")
            .field("backends", &backends)
            .field("backoff", &self.backoff)
            .field("frozen", &self.state.lock().frozen_until.len())
            .finish()
    }
}

impl FailoverSelector {
    pub fn new(backends: Vec<BackendDescriptor>, backoff: BackoffPolicy) -> Result<Self> {
        Self::with_rng(backends, backoff, StdRng::from_entropy())
    }

    pub fn with_rng(
        backends: Vec<BackendDescriptor>,
        backoff: BackoffPolicy,
        rng: StdRng,
    ) -> Result<Self> {
        if backends.is_empty() {
            return Err(ProxyError::Config(
                "Cannot build a selector without providers".to_string(),
            ));
        }

        let fallback = default_weight(backends.len());
        let weights: Vec<f64> = backends
            .iter()
            .map(|b| if b.priority() > 0 { b.priority() as f64 } else { fallback })
            .collect();

        let sampler = WeightedSampler::new(&weights)
            .ok_or_else(|| ProxyError::Internal("Empty weight vector".to_string()))?;

        Ok(Self {
            backends,
            sampler,
            backoff,
            state: Mutex::new(SelectorState {
                frozen_until: HashMap::new(),
                failures: HashMap::new(),
                rng,
            }),
        })
    }

    pub fn backends(&self) -> &[BackendDescriptor] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Pick a backend for the next attempt.
    ///
    /// `last_failed` is quarantined first. With `strict`, any backend on the
    /// same address as `last_failed` counts as the same backend.
    pub fn select(
        &self,
        last_failed: Option<&BackendDescriptor>,
        strict: bool,
    ) -> Option<BackendDescriptor> {
        self.select_at(last_failed, strict, Instant::now())
    }

    pub(crate) fn select_at(
        &self,
        last_failed: Option<&BackendDescriptor>,
        strict: bool,
        now: Instant,
    ) -> Option<BackendDescriptor> {
        match self.backends.len() {
            0 => return None,
            // Nothing to fail over to.
            1 => return self.backends.first().cloned(),
            _ => {}
        }

        let mut state = self.state.lock();
        if let Some(last) = last_failed {
            self.freeze_locked(&mut state, last, now);
        }

        let index = self.sampler.sample_with(&mut state.rng);
        let candidate = &self.backends[index];

        let rejected = last_failed.is_some_and(|last| candidate.matches(last, strict))
            || state.on_hold(candidate.id(), now);
        if !rejected {
            return Some(candidate.clone());
        }

        tracing::debug!(
            backend = %candidate,
            strict = strict,
            "Sampled provider rejected, selecting alternative"
        );
        self.alternative_locked(&mut state, last_failed, strict, now)
    }

    /// Uniform pick from the best non-empty tier:
    /// healthy and distinct from `last_failed`, then same address with a
    /// different credential, then quarantined distinct backends, then
    /// `last_failed` itself.
    pub fn select_alternative(
        &self,
        last_failed: Option<&BackendDescriptor>,
        strict: bool,
    ) -> Option<BackendDescriptor> {
        let now = Instant::now();
        let mut state = self.state.lock();
        self.alternative_locked(&mut state, last_failed, strict, now)
    }

    fn alternative_locked(
        &self,
        state: &mut SelectorState,
        last_failed: Option<&BackendDescriptor>,
        strict: bool,
        now: Instant,
    ) -> Option<BackendDescriptor> {
        let mut healthy = Vec::new();
        let mut same_address = Vec::new();
        let mut quarantined = Vec::new();
        let mut failed = Vec::new();

        for backend in &self.backends {
            let held = state.on_hold(backend.id(), now);
            match last_failed {
                Some(last) if backend.matches(last, strict) => {
                    if backend.credential() != last.credential() {
                        same_address.push(backend);
                    } else {
                        failed.push(backend);
                    }
                }
                _ if held => quarantined.push(backend),
                _ => healthy.push(backend),
            }
        }

        let SelectorState {
            frozen_until, rng, ..
        } = state;

        if !healthy.is_empty() {
            return pick_preferring(rng, &healthy, |b| !b.unstable());
        }

        for tier in [same_address, quarantined, failed] {
            if !tier.is_empty() {
                return pick_preferring(rng, &tier, |b| !state_on_hold(frozen_until, b.id(), now));
            }
        }

        None
    }

    /// Quarantine `backend` for the next backoff step, extending any
    /// quarantine still in force.
    pub fn freeze(&self, backend: &BackendDescriptor) {
        self.freeze_at(backend, Instant::now());
    }

    pub(crate) fn freeze_at(&self, backend: &BackendDescriptor, now: Instant) {
        let mut state = self.state.lock();
        self.freeze_locked(&mut state, backend, now);
    }

    fn freeze_locked(&self, state: &mut SelectorState, backend: &BackendDescriptor, now: Instant) {
        let backoff = self.next_backoff(state, backend.id());

        let base = match state.frozen_until.get(backend.id()) {
            Some(until) if *until > now => *until,
            _ => now,
        };
        let until = base.checked_add(backoff).unwrap_or(base);
        state.frozen_until.insert(backend.id().clone(), until);

        tracing::debug!(
            backend = %backend,
            backoff_ms = backoff.as_millis() as u64,
            "Provider frozen"
        );
    }

    fn next_backoff(&self, state: &mut SelectorState, id: &BackendId) -> Duration {
        let count = state.failures.entry(id.clone()).or_insert(0);
        *count = count.saturating_add(1);
        self.backoff.duration_for(*count)
    }

    /// Forget quarantine and failure history after a confirmed success.
    pub fn unfreeze(&self, backend: &BackendDescriptor) {
        let mut state = self.state.lock();
        state.frozen_until.remove(backend.id());
        state.failures.remove(backend.id());
    }

    pub fn on_hold(&self, backend: &BackendDescriptor) -> bool {
        self.on_hold_at(backend, Instant::now())
    }

    pub(crate) fn on_hold_at(&self, backend: &BackendDescriptor, now: Instant) -> bool {
        self.state.lock().on_hold(backend.id(), now)
    }

    pub fn failures(&self, backend: &BackendDescriptor) -> u32 {
        self.state
            .lock()
            .failures
            .get(backend.id())
            .copied()
            .unwrap_or(0)
    }

    pub fn frozen_until(&self, backend: &BackendDescriptor) -> Option<Instant> {
        self.state.lock().frozen_until.get(backend.id()).copied()
    }
}

/// Weight given to backends without a positive priority: `ceil(100 / n)`.
pub fn default_weight(n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    100usize.div_ceil(n) as f64
}

fn state_on_hold(frozen_until: &HashMap<BackendId, Instant>, id: &BackendId, now: Instant) -> bool {
    frozen_until.get(id).is_some_and(|until| *until > now)
}

fn pick_preferring<F>(
    rng: &mut StdRng,
    candidates: &[&BackendDescriptor],
    prefer: F,
) -> Option<BackendDescriptor>
where
    F: Fn(&BackendDescriptor) -> bool,
{
    let preferred: Vec<&BackendDescriptor> =
        candidates.iter().copied().filter(|b| prefer(*b)).collect();
    let pool = if preferred.is_empty() {
        candidates
    } else {
        preferred.as_slice()
    };
    pool.choose(rng).map(|b| (*b).clone())
}
