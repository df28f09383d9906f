//! Cache operation error types
//!
//! Expected outcomes on the update path (version conflict, missing target,
//! retry exhaustion) are not errors; they are modeled as result enums in the
//! update module. Errors here are reserved for argument validation and
//! backend or backplane failures.

/// Errors surfaced by manager and handle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Caller passed an invalid argument (empty key, empty handle chain).
    /// Validated eagerly before any handle is touched.
    InvalidArgument(String),
    /// A concrete backend failed the operation. Mutations already applied to
    /// other handles are not rolled back.
    BackendUnavailable { handle: String, reason: String },
    /// The backplane transport rejected a publish or subscribe call.
    BackplaneUnavailable(String),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CacheError::BackendUnavailable { handle, reason } => {
                write!(f, "Backend '{}' unavailable: {}", handle, reason)
            }
            CacheError::BackplaneUnavailable(msg) => {
                write!(f, "Backplane unavailable: {}", msg)
            }
        }
    }
}

impl std::error::Error for CacheError {}

impl CacheError {
    /// Create an invalid argument error
    #[inline(always)]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a backend failure error
    #[inline(always)]
    pub fn backend_unavailable(handle: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            handle: handle.into(),
            reason: reason.into(),
        }
    }

    /// Create a backplane failure error
    #[inline(always)]
    pub fn backplane_unavailable(msg: impl Into<String>) -> Self {
        Self::BackplaneUnavailable(msg.into())
    }
}
