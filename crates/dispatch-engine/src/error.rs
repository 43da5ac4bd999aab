use thiserror::Error;

/// Error types for emergency dispatch operations
///
/// Covers the full failure taxonomy of the dispatch core, from intake
/// validation through claim races and candidate exhaustion. Every mutating
/// operation returns one of these explicitly; nothing is swallowed.
///
/// # Examples
///
/// ```
/// use juricall_dispatch_engine::{DispatchError, Result};
///
/// fn confirm() -> Result<()> {
///     Err(DispatchError::stale_state("call already completed"))
/// }
///
/// match confirm() {
///     Err(DispatchError::StaleState(msg)) => println!("too late: {}", msg),
///     other => println!("{:?}", other),
/// }
/// ```
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Malformed coordinates or missing required fields at intake.
    ///
    /// Rejected before anything is persisted.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A claim or transition lost a race: the lawyer is already assigned
    /// elsewhere, or the call has already left the expected state.
    ///
    /// The caller must re-read state; the core never retries this silently.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The matcher exhausted its radius expansions with zero eligible
    /// lawyers. The call stays `pending` and is surfaced for escalation.
    #[error("No candidates within {radius_km:.1} km after {expansions} expansions")]
    NoCandidates {
        /// Number of radius doublings performed before giving up.
        expansions: u32,
        /// The final search radius reached.
        radius_km: f64,
    },

    /// An internal timing signal (acceptance window elapsed). Drives
    /// automatic re-dispatch; never user-visible.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// A confirm/reject/cancel arrived after the call already transitioned
    /// terminally. Reported to the caller, no state change.
    #[error("Stale state: {0}")]
    StaleState(String),

    /// The acting principal is not allowed to perform this transition
    /// (e.g. a lawyer confirming a call assigned to someone else).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The referenced call or lawyer does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The engine is at a configured capacity limit.
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Persistence failures from the optional SQLite layer.
    #[error("Database error: {0}")]
    Database(String),

    /// Invalid configuration values detected at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A notification collaborator failed. Logged by the engine; never
    /// rolls back a dispatch transition.
    #[error("Notification error: {0}")]
    Notification(String),

    /// Unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for DispatchError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for DispatchError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl DispatchError {
    /// Create a new Validation error with the provided message
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new Conflict error with the provided message
    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a new Timeout error with the provided message
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a new StaleState error with the provided message
    pub fn stale_state<S: Into<String>>(msg: S) -> Self {
        Self::StaleState(msg.into())
    }

    /// Create a new Unauthorized error with the provided message
    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create a new NotFound error with the provided message
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new Database error with the provided message
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    /// Create a new Configuration error with the provided message
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new Notification error with the provided message
    pub fn notification<S: Into<String>>(msg: S) -> Self {
        Self::Notification(msg.into())
    }

    /// Create a new Internal error with the provided message
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type for dispatch operations
///
/// Type alias for `std::result::Result<T, DispatchError>` used throughout
/// the engine.
pub type Result<T> = std::result::Result<T, DispatchError>;
