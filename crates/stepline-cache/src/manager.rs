//! The cache manager.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::policy::{ReloadPolicy, ReloadReason};
use crate::source::ReloadSource;

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Number of successful loads since construction.
    pub loads: u64,
    /// `get()` calls since the last successful load.
    pub calls_since_load: u64,
    /// Whether a value is cached.
    pub has_value: bool,
    /// Whether the cache has been marked stale.
    pub stale: bool,
}

struct CacheState<T> {
    value: Option<Arc<T>>,
    last_load: Option<Instant>,
    calls_since_load: u64,
    last_change_check: Option<Instant>,
    stale: bool,
    loads: u64,
}

impl<T> CacheState<T> {
    fn empty() -> Self {
        Self {
            value: None,
            last_load: None,
            calls_since_load: 0,
            last_change_check: None,
            stale: false,
            loads: 0,
        }
    }
}

/// Throttled, single-flight cache around a [`ReloadSource`].
///
/// All decisions and reloads happen under one mutex, so concurrent callers
/// never run the loader twice for the same decision: the second caller
/// waits and then sees the freshly loaded value.
pub struct CacheManager<T> {
    name: String,
    source: Box<dyn ReloadSource<Value = T>>,
    policy: ReloadPolicy,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState<T>>,
}

impl<T: Send + Sync + 'static> CacheManager<T> {
    /// Create a cache using the system clock. Nothing is loaded until the first `get()`.
    pub fn new<S>(name: impl Into<String>, source: S, policy: ReloadPolicy) -> Self
    where
        S: ReloadSource<Value = T> + 'static,
    {
        Self::with_clock(name, source, policy, Arc::new(SystemClock))
    }

    /// Create a cache with an explicit clock.
    pub fn with_clock<S>(
        name: impl Into<String>,
        source: S,
        policy: ReloadPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        S: ReloadSource<Value = T> + 'static,
    {
        Self {
            name: name.into(),
            source: Box::new(source),
            policy,
            clock,
            state: Mutex::new(CacheState::empty()),
        }
    }

    /// The effective policy.
    pub fn policy(&self) -> &ReloadPolicy {
        &self.policy
    }

    /// Return the cached value, reloading first if the policy says so.
    ///
    /// Loader errors propagate and leave the previously cached value in place.
    pub fn get(&self) -> Result<Arc<T>> {
        let mut state = self.state.lock();
        state.calls_since_load = state.calls_since_load.saturating_add(1);
        let now = self.clock.now();

        let reason = self.reload_reason(&mut state, now);
        if reason.is_none()
            && let Some(value) = &state.value
        {
            return Ok(Arc::clone(value));
        }
        self.reload(&mut state, now, reason.unwrap_or(ReloadReason::Initial))
    }

    /// Reload unconditionally and reset the call counter.
    pub fn force_reload(&self) -> Result<Arc<T>> {
        let mut state = self.state.lock();
        let now = self.clock.now();
        self.reload(&mut state, now, ReloadReason::Forced)
    }

    /// Mark the cache stale so the next `get()` reloads.
    pub fn notify_changed(&self) {
        let mut state = self.state.lock();
        if !state.stale {
            debug!(cache = %self.name, "marked stale");
        }
        state.stale = true;
    }

    /// The cached value without touching counters or the source.
    pub fn peek(&self) -> Option<Arc<T>> {
        self.state.lock().value.clone()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            loads: state.loads,
            calls_since_load: state.calls_since_load,
            has_value: state.value.is_some(),
            stale: state.stale,
        }
    }

    fn reload_reason(&self, state: &mut CacheState<T>, now: Instant) -> Option<ReloadReason> {
        let Some(last_load) = state.last_load.filter(|_| state.value.is_some()) else {
            return Some(ReloadReason::Initial);
        };

        if state.stale {
            return Some(ReloadReason::Stale);
        }

        let max_calls = self.policy.max_calls_before_reload();
        if max_calls > 0 && state.calls_since_load >= max_calls {
            return Some(ReloadReason::CallLimit);
        }

        if now.saturating_duration_since(last_load) < self.policy.min_reload_interval() {
            return None;
        }

        let check_due = state.last_change_check.is_none_or(|checked| {
            now.saturating_duration_since(checked) >= self.policy.change_check_interval()
        });
        if !check_due {
            return None;
        }

        state.last_change_check = Some(now);
        match self.source.has_changed() {
            Ok(true) => Some(ReloadReason::Changed),
            Ok(false) => None,
            Err(e) => {
                warn!(cache = %self.name, error = %e, "change check failed, reloading");
                Some(ReloadReason::ChangeCheckFailed)
            }
        }
    }

    fn reload(
        &self,
        state: &mut CacheState<T>,
        now: Instant,
        reason: ReloadReason,
    ) -> Result<Arc<T>> {
        let started = Instant::now();
        let value = match self.source.load() {
            Ok(value) => Arc::new(value),
            Err(e) => {
                warn!(cache = %self.name, %reason, error = %e, "reload failed");
                return Err(e);
            }
        };

        state.value = Some(Arc::clone(&value));
        state.last_load = Some(now);
        state.last_change_check = Some(now);
        state.calls_since_load = 0;
        state.stale = false;
        state.loads += 1;

        info!(
            cache = %self.name,
            %reason,
            loads = state.loads,
            duration_ms = started.elapsed().as_millis() as u64,
            "reloaded"
        );
        Ok(value)
    }
}

impl<T> std::fmt::Debug for CacheManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::CacheError;
    use crate::source::FnSource;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::time::Duration;

    struct Probe {
        loads: Arc<AtomicU64>,
        checks: Arc<AtomicU64>,
        changed: Arc<AtomicBool>,
        fail_load: Arc<AtomicBool>,
        fail_check: Arc<AtomicBool>,
    }

    impl Probe {
        fn new() -> Self {
            Self {
                loads: Arc::new(AtomicU64::new(0)),
                checks: Arc::new(AtomicU64::new(0)),
                changed: Arc::new(AtomicBool::new(false)),
                fail_load: Arc::new(AtomicBool::new(false)),
                fail_check: Arc::new(AtomicBool::new(false)),
            }
        }

        /// Source whose value is the load sequence number.
        fn source(&self) -> FnSource<u64> {
            let loads = Arc::clone(&self.loads);
            let fail_load = Arc::clone(&self.fail_load);
            let checks = Arc::clone(&self.checks);
            let changed = Arc::clone(&self.changed);
            let fail_check = Arc::clone(&self.fail_check);
            FnSource::new(move || {
                if fail_load.load(Ordering::SeqCst) {
                    return Err(CacheError::load("source unavailable"));
                }
                Ok(loads.fetch_add(1, Ordering::SeqCst) + 1)
            })
            .with_change_detector(move || {
                checks.fetch_add(1, Ordering::SeqCst);
                if fail_check.load(Ordering::SeqCst) {
                    return Err(CacheError::change_check("stat failed"));
                }
                Ok(changed.swap(false, Ordering::SeqCst))
            })
        }

        fn loads(&self) -> u64 {
            self.loads.load(Ordering::SeqCst)
        }

        fn checks(&self) -> u64 {
            self.checks.load(Ordering::SeqCst)
        }
    }

    fn manager(probe: &Probe, policy: ReloadPolicy) -> (CacheManager<u64>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = CacheManager::with_clock("test", probe.source(), policy, clock.clone());
        (cache, clock)
    }

    fn lazy_policy() -> ReloadPolicy {
        ReloadPolicy::new()
            .with_min_reload_interval(Duration::from_secs(3600))
            .with_max_calls_before_reload(0)
            .with_change_check_interval(Duration::from_secs(3600))
    }

    #[test]
    fn test_first_get_loads_once() {
        let probe = Probe::new();
        let (cache, _clock) = manager(&probe, lazy_policy());

        assert!(cache.peek().is_none());
        assert_eq!(*cache.get().unwrap(), 1);
        assert_eq!(probe.loads(), 1);

        assert_eq!(*cache.get().unwrap(), 1);
        assert_eq!(probe.loads(), 1);
        assert_eq!(probe.checks(), 0);
    }

    #[test]
    fn test_force_reload_resets_counter() {
        let probe = Probe::new();
        let (cache, _clock) = manager(&probe, lazy_policy());

        cache.get().unwrap();
        cache.get().unwrap();
        cache.get().unwrap();
        assert_eq!(cache.stats().calls_since_load, 2);

        assert_eq!(*cache.force_reload().unwrap(), 2);
        assert_eq!(cache.stats().calls_since_load, 0);
        assert_eq!(cache.stats().loads, 2);
    }

    #[test]
    fn test_call_limit_forces_reload_inside_min_interval() {
        let probe = Probe::new();
        let policy = lazy_policy().with_max_calls_before_reload(3);
        let (cache, _clock) = manager(&probe, policy);

        assert_eq!(*cache.get().unwrap(), 1);
        assert_eq!(*cache.get().unwrap(), 1);
        assert_eq!(*cache.get().unwrap(), 1);
        // Third call after the load hits the ceiling.
        assert_eq!(*cache.get().unwrap(), 2);
        assert_eq!(probe.loads(), 2);
    }

    #[test]
    fn test_min_interval_skips_change_detection() {
        let probe = Probe::new();
        let policy = ReloadPolicy::new()
            .with_min_reload_interval(Duration::from_secs(10))
            .with_max_calls_before_reload(0)
            .with_change_check_interval(Duration::ZERO);
        let (cache, clock) = manager(&probe, policy);

        cache.get().unwrap();
        probe.changed.store(true, Ordering::SeqCst);
        clock.advance(Duration::from_secs(9));
        assert_eq!(*cache.get().unwrap(), 1);
        assert_eq!(probe.checks(), 0);

        clock.advance(Duration::from_secs(1));
        assert_eq!(*cache.get().unwrap(), 2);
        assert_eq!(probe.checks(), 1);
    }

    #[test]
    fn test_change_check_interval_throttles_detector() {
        let probe = Probe::new();
        let policy = ReloadPolicy::new()
            .with_min_reload_interval(Duration::ZERO)
            .with_max_calls_before_reload(0)
            .with_change_check_interval(Duration::from_secs(2));
        let (cache, clock) = manager(&probe, policy);

        cache.get().unwrap();
        clock.advance(Duration::from_secs(1));
        cache.get().unwrap();
        assert_eq!(probe.checks(), 0);

        clock.advance(Duration::from_secs(1));
        cache.get().unwrap();
        assert_eq!(probe.checks(), 1);
        assert_eq!(probe.loads(), 1);

        // Check timestamp was updated even though nothing changed.
        clock.advance(Duration::from_secs(1));
        cache.get().unwrap();
        assert_eq!(probe.checks(), 1);

        probe.changed.store(true, Ordering::SeqCst);
        clock.advance(Duration::from_secs(1));
        assert_eq!(*cache.get().unwrap(), 2);
        assert_eq!(probe.checks(), 2);
    }

    #[test]
    fn test_change_check_error_reloads() {
        let probe = Probe::new();
        let policy = ReloadPolicy::new()
            .with_min_reload_interval(Duration::ZERO)
            .with_max_calls_before_reload(0)
            .with_change_check_interval(Duration::ZERO);
        let (cache, _clock) = manager(&probe, policy);

        cache.get().unwrap();
        probe.fail_check.store(true, Ordering::SeqCst);
        assert_eq!(*cache.get().unwrap(), 2);
    }

    #[test]
    fn test_load_error_preserves_previous_value() {
        let probe = Probe::new();
        let (cache, _clock) = manager(&probe, lazy_policy());

        cache.get().unwrap();
        probe.fail_load.store(true, Ordering::SeqCst);

        let err = cache.force_reload().unwrap_err();
        assert!(matches!(err, CacheError::Load(_)));
        assert_eq!(cache.peek().map(|v| *v), Some(1));
        assert_eq!(cache.stats().loads, 1);

        // Cached value is still served when no reload is due.
        assert_eq!(*cache.get().unwrap(), 1);
    }

    #[test]
    fn test_first_load_error_retries_next_call() {
        let probe = Probe::new();
        let (cache, _clock) = manager(&probe, lazy_policy());

        probe.fail_load.store(true, Ordering::SeqCst);
        assert!(cache.get().is_err());
        assert!(!cache.stats().has_value);

        probe.fail_load.store(false, Ordering::SeqCst);
        assert_eq!(*cache.get().unwrap(), 1);
    }

    #[test]
    fn test_notify_changed_reloads_on_next_get() {
        let probe = Probe::new();
        let (cache, _clock) = manager(&probe, lazy_policy());

        cache.get().unwrap();
        cache.notify_changed();
        assert!(cache.stats().stale);
        // Marking stale alone does not load.
        assert_eq!(probe.loads(), 1);

        assert_eq!(*cache.get().unwrap(), 2);
        assert!(!cache.stats().stale);
        assert_eq!(*cache.get().unwrap(), 2);
    }

    #[test]
    fn test_source_without_detector_never_reports_change() {
        let counter = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&counter);
        let source = FnSource::new(move || Ok(c.fetch_add(1, Ordering::SeqCst)));
        let policy = ReloadPolicy::new()
            .with_min_reload_interval(Duration::ZERO)
            .with_max_calls_before_reload(0)
            .with_change_check_interval(Duration::ZERO);
        let cache = CacheManager::new("plain", source, policy);

        for _ in 0..5 {
            cache.get().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
