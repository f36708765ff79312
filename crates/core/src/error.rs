//! Error taxonomy for the execution engine.
//!
//! Each component owns one error enum. Transient and throttling errors
//! are retried locally with bounded backoff; auth-rejection errors
//! trigger exactly one credential refresh-and-retry; everything else is
//! terminal for the affected execution and recorded on it. No error
//! crosses the batch boundary — the caller always receives a
//! `BatchResult` with per-instance outcomes.

/// Failure acquiring or refreshing a credential.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CredentialError {
    /// The base credential is invalid or expired; the operator must
    /// resupply it. Non-retryable.
    #[error("Invalid base credential: {0}")]
    InvalidBase(String),

    /// The trust relationship rejected the role assumption.
    /// Non-retryable.
    #[error("Role assumption denied: {0}")]
    AssumptionDenied(String),

    /// A transient identity-service failure. Retryable with backoff.
    #[error("Transient credential error: {0}")]
    Transient(String),

    /// No base credential has been supplied for the environment.
    #[error("No credentials configured for environment {0}")]
    Missing(String),
}

impl CredentialError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Failure submitting a command to one instance.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    /// The target is not in a dispatch-eligible lifecycle state.
    /// Non-retryable for this instance.
    #[error("Instance {instance_id} is not eligible for dispatch: {reason}")]
    IneligibleState {
        instance_id: String,
        reason: String,
    },

    /// The transport throttled the request. Retryable with exponential
    /// backoff, bounded attempts.
    #[error("Dispatch throttled: {0}")]
    Throttled(String),

    /// The transport rejected the credential. Bubbles to the caller to
    /// trigger a credential refresh.
    #[error("Dispatch credential rejected: {0}")]
    AuthRejected(String),

    /// Any other transport failure.
    #[error("Dispatch failed: {0}")]
    Other(String),
}

impl DispatchError {
    pub fn is_throttle(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }
}

/// Failure enumerating instances.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DiscoveryError {
    /// The credential expired mid-call. Retryable exactly once after a
    /// credential refresh.
    #[error("Discovery credentials expired: {0}")]
    AuthExpired(String),

    /// A transient discovery failure.
    #[error("Transient discovery error: {0}")]
    Transient(String),
}

/// Failure polling or cancelling a dispatched command.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TrackingError {
    /// The remote-execution service could not be reached.
    #[error("Remote execution service unreachable: {0}")]
    RemoteUnreachable(String),

    /// The service answered with a response the engine cannot
    /// interpret.
    #[error("Malformed tracking response: {0}")]
    MalformedResponse(String),
}

/// Errors surfaced by the caller-facing engine operations.
///
/// Batch execution itself never raises — failures are data in the
/// `BatchResult`. These cover the ancillary operations (lookup,
/// discovery, credential management).
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// No batch is registered under the given ID.
    #[error("Batch {0} not found")]
    BatchNotFound(uuid::Uuid),
}
