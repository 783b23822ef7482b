//! Error taxonomy for the supervisor.
//!
//! Two classes matter at runtime: configuration problems are fatal and abort
//! startup, while device-communication problems are per-cycle and recoverable.
//! Keeping them as distinct types means callers cannot conflate "this config
//! can never work" with "this device did not answer this cycle".

use thiserror::Error;

/// Configuration error with field path and constraint description.
///
/// Raised once, at construction, and never recovered: an engine is not
/// allowed to start with an invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"stages[0].points"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    /// Creates a configuration error for the given field.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Device-communication failure reported by the BACnet link.
///
/// All variants are recoverable: the affected read or write is skipped this
/// cycle and retried from scratch on the next one. Engine state is left
/// unchanged, so a persistently unreachable device manifests as repeated log
/// lines, never as a stage change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// No device answered at the given address.
    #[error("device not found at {0}")]
    DeviceNotFound(String),
    /// More than one device answered a discovery query.
    #[error("ambiguous device discovery for {0}")]
    AmbiguousDevice(String),
    /// The device rejected, aborted, or nack'd the request.
    #[error("protocol reject from {0}")]
    ProtocolReject(String),
    /// No answer within the link's deadline.
    #[error("request to {0} timed out")]
    Timeout(String),
    /// The addressed property does not exist or is unsupported.
    #[error("invalid or unsupported property on {0}")]
    InvalidProperty(String),
}

/// Recoverable failure from a strategy's step body.
///
/// Logged by the runner; the current cycle is abandoned and the loop
/// continues.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Link(#[from] LinkError),
    /// Unexpected condition outside device I/O (e.g. a value of the wrong
    /// type where one was required to proceed).
    #[error("transient step failure: {0}")]
    Transient(String),
}

/// Fatal failure from a strategy's start or stop boundary.
///
/// Propagates out of the runner and terminates the process after cleanup has
/// been attempted.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("device link failed at a lifecycle boundary: {0}")]
    Link(#[from] LinkError),
    #[error("lifecycle failure: {0}")]
    Other(String),
}
