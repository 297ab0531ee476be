//! Throttled reload cache.
//!
//! Wraps any "slow loader + optional change detector" pair behind a
//! [`CacheManager::get`] that decides, per call, whether the cached value
//! is still good enough:
//! - the first call always loads
//! - a call-count ceiling forces a reload
//! - a minimum interval throttles reloads
//! - a periodic change check reloads when the source reports a change
//!
//! # Example
//!
//! ```rust,ignore
//! use stepline_cache::{CacheManager, FnSource, ReloadPolicy};
//!
//! let source = FnSource::new(|| Ok(scan_directory()?))
//!     .with_change_detector(|| Ok(directory_changed()?));
//! let policy = ReloadPolicy::default().with_max_calls_before_reload(50);
//!
//! let cache = CacheManager::new("catalog", source, policy);
//! let catalog = cache.get()?;
//! ```

mod clock;
mod error;
mod manager;
mod policy;
mod source;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CacheError, Result};
pub use manager::{CacheManager, CacheStats};
pub use policy::{ReloadPolicy, ReloadReason};
pub use source::{FnSource, ReloadSource};
