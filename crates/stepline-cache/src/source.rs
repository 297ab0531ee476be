//! Loader and change-detector hooks.
//!
//! The cache is decoupled from where values come from through the
//! [`ReloadSource`] trait, which uses an associated `Value` type so a
//! source can produce a rich domain object (a tool catalog, a parsed
//! directory) without an intermediate representation.

use crate::error::Result;

/// A slow, authoritative source of a cached value.
pub trait ReloadSource: Send + Sync {
    /// The value type stored in the cache.
    type Value: Send + Sync + 'static;

    /// Build a fresh value from the source.
    ///
    /// Called under the cache's reload lock, so at most one load runs at a time.
    fn load(&self) -> Result<Self::Value>;

    /// Report whether the source has changed since the last load.
    ///
    /// Sources without a cheap change signal keep the default, which never
    /// reports a change; such caches rely on the call-count ceiling and
    /// explicit notification instead.
    fn has_changed(&self) -> Result<bool> {
        Ok(false)
    }
}

type Loader<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;
type Detector = Box<dyn Fn() -> Result<bool> + Send + Sync>;

/// A [`ReloadSource`] built from closures.
pub struct FnSource<T> {
    loader: Loader<T>,
    detector: Option<Detector>,
}

impl<T> FnSource<T> {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            detector: None,
        }
    }

    /// Attach a change detector.
    pub fn with_change_detector<F>(mut self, detector: F) -> Self
    where
        F: Fn() -> Result<bool> + Send + Sync + 'static,
    {
        self.detector = Some(Box::new(detector));
        self
    }
}

impl<T> std::fmt::Debug for FnSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSource")
            .field("has_detector", &self.detector.is_some())
            .finish()
    }
}

impl<T: Send + Sync + 'static> ReloadSource for FnSource<T> {
    type Value = T;

    fn load(&self) -> Result<T> {
        (self.loader)()
    }

    fn has_changed(&self) -> Result<bool> {
        match &self.detector {
            Some(detect) => detect(),
            None => Ok(false),
        }
    }
}
