use crate::ledger::LedgerError;
use crate::membership::MembershipError;
use thiserror::Error;

/// Error types for state machine operations
#[derive(Error, Debug)]
pub enum StateMachineError {
    #[error("Guard condition failed: {reason}")]
    GuardFailed { reason: String },

    #[error("Invalid state transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Action execution failed: {reason}")]
    ActionFailed { reason: String },

    #[error("No attempt is bound to the state machine")]
    NoActiveAttempt,
}

/// Guard condition failures
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Transfers still outstanding: {outstanding} of {planned} planned tasks not completed")]
    TransfersOutstanding { outstanding: usize, planned: usize },

    #[error("Ledger query failed: {0}")]
    Ledger(#[from] LedgerError),
}

/// Action execution failures
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Membership update failed: {0}")]
    Membership(#[from] MembershipError),

    #[error("Ledger update failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Releasing the decommission lock failed: {0}")]
    LockRelease(String),
}

impl From<GuardError> for StateMachineError {
    fn from(err: GuardError) -> Self {
        Self::GuardFailed {
            reason: err.to_string(),
        }
    }
}

impl From<ActionError> for StateMachineError {
    fn from(err: ActionError) -> Self {
        Self::ActionFailed {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for state machine operations
pub type StateMachineResult<T> = Result<T, StateMachineError>;
pub type GuardResult<T> = Result<T, GuardError>;
pub type ActionResult<T> = Result<T, ActionError>;
