//! Reload policy thresholds.

use std::time::Duration;

/// Default minimum time between two reloads.
pub const DEFAULT_MIN_RELOAD_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of `get()` calls after which a reload is forced.
pub const DEFAULT_MAX_CALLS_BEFORE_RELOAD: u64 = 100;

/// Default minimum time between two change-detector invocations.
pub const DEFAULT_CHANGE_CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Thresholds governing when a cached value is recomputed.
///
/// Each threshold has a base value and an optional override. A non-zero
/// override always wins over the base. A zero effective value disables the
/// rule: no throttle for the intervals, no call ceiling for the counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadPolicy {
    pub min_reload_interval: Duration,
    pub max_calls_before_reload: u64,
    pub change_check_interval: Duration,
    pub min_reload_interval_override: Option<Duration>,
    pub max_calls_before_reload_override: Option<u64>,
    pub change_check_interval_override: Option<Duration>,
}

impl Default for ReloadPolicy {
    fn default() -> Self {
        Self {
            min_reload_interval: DEFAULT_MIN_RELOAD_INTERVAL,
            max_calls_before_reload: DEFAULT_MAX_CALLS_BEFORE_RELOAD,
            change_check_interval: DEFAULT_CHANGE_CHECK_INTERVAL,
            min_reload_interval_override: None,
            max_calls_before_reload_override: None,
            change_check_interval_override: None,
        }
    }
}

impl ReloadPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_reload_interval(mut self, interval: Duration) -> Self {
        self.min_reload_interval = interval;
        self
    }

    pub fn with_max_calls_before_reload(mut self, calls: u64) -> Self {
        self.max_calls_before_reload = calls;
        self
    }

    pub fn with_change_check_interval(mut self, interval: Duration) -> Self {
        self.change_check_interval = interval;
        self
    }

    pub fn with_min_reload_interval_override(mut self, interval: Duration) -> Self {
        self.min_reload_interval_override = Some(interval);
        self
    }

    pub fn with_max_calls_before_reload_override(mut self, calls: u64) -> Self {
        self.max_calls_before_reload_override = Some(calls);
        self
    }

    pub fn with_change_check_interval_override(mut self, interval: Duration) -> Self {
        self.change_check_interval_override = Some(interval);
        self
    }

    /// Effective minimum reload interval.
    pub fn min_reload_interval(&self) -> Duration {
        self.min_reload_interval_override
            .filter(|d| !d.is_zero())
            .unwrap_or(self.min_reload_interval)
    }

    /// Effective call ceiling. `0` means no ceiling.
    pub fn max_calls_before_reload(&self) -> u64 {
        self.max_calls_before_reload_override
            .filter(|n| *n != 0)
            .unwrap_or(self.max_calls_before_reload)
    }

    /// Effective change-check interval.
    pub fn change_check_interval(&self) -> Duration {
        self.change_check_interval_override
            .filter(|d| !d.is_zero())
            .unwrap_or(self.change_check_interval)
    }
}

/// Why a reload happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReason {
    /// Nothing cached yet.
    Initial,
    /// Marked stale through `notify_changed`.
    Stale,
    /// The call ceiling was reached.
    CallLimit,
    /// The change detector reported a change.
    Changed,
    /// The change detector failed.
    ChangeCheckFailed,
    /// Explicit `force_reload`.
    Forced,
}

impl std::fmt::Display for ReloadReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initial => "initial",
            Self::Stale => "stale",
            Self::CallLimit => "call_limit",
            Self::Changed => "changed",
            Self::ChangeCheckFailed => "change_check_failed",
            Self::Forced => "forced",
        };
        f.write_str(s)
    }
}
