//! Error types for cache operations.

/// Error type for cache operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The loader failed; the previously cached value is untouched.
    #[error("Load failed: {0}")]
    Load(String),

    /// The change detector failed. Treated as "changed".
    #[error("Change check failed: {0}")]
    ChangeCheck(String),
}

impl CacheError {
    /// Create a load error.
    pub fn load(msg: impl std::fmt::Display) -> Self {
        Self::Load(msg.to_string())
    }

    /// Create a change-check error.
    pub fn change_check(msg: impl std::fmt::Display) -> Self {
        Self::ChangeCheck(msg.to_string())
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
