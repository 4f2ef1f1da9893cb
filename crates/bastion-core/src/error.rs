use thiserror::Error;

/// Engine-wide error types for the Bastion safety module.
///
/// Every operation validates before it mutates, so returning any of these
/// leaves the module exactly as it was before the call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BastionError {
    /// Operation is forbidden in the current lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Requested lifecycle transition is not allowed from the current state.
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// A proposed configuration failed validation or does not match the queued commitment.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Config update finalized outside its [earliest, deadline] window.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Caller lacks the required role or entitlement.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The operation was asked to move a zero amount.
    #[error("Amount is zero")]
    AmountIsZero,

    /// The operation would move zero value after rounding.
    #[error("Amount rounds to zero: {0}")]
    RoundsToZero(String),

    /// The drip model returned a factor above one whole.
    #[error("Invalid drip factor: {0}")]
    InvalidDripFactor(String),

    /// Loss-detector is unbound, already fired, or not reporting a trigger.
    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    /// A loss exceeds the pool's per-call maximum.
    #[error("Loss exceeds maximum: {0}")]
    ExceedsMaxLoss(String),

    /// A withdrawal was completed before its delay elapsed.
    #[error("Delay not elapsed: {0}")]
    DelayNotElapsed(String),

    /// Account balance or allowance is too small.
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// Pool, request, or module not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The asset boundary refused a transfer.
    #[error("Asset error: {0}")]
    Asset(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The owning actor of a module is gone or dropped the reply.
    #[error("Mailbox error: {0}")]
    Mailbox(String),
}

impl From<serde_json::Error> for BastionError {
    fn from(e: serde_json::Error) -> Self {
        BastionError::Serialization(e.to_string())
    }
}
