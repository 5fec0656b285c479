//! # Decommission State Machine
//!
//! Lifecycle of a node's decommission: states, the events that move between
//! them, guards that must hold before a transition, and the actions run once
//! a transition is persisted.

pub mod actions;
pub mod decommission_state_machine;
pub mod errors;
pub mod events;
pub mod guards;
pub mod persistence;
pub mod states;

// Re-export main types for convenient access
pub use decommission_state_machine::{
    DecommissionContext, DecommissionReport, DecommissionStateMachine,
};
pub use errors::{ActionError, GuardError, StateMachineError, StateMachineResult};
pub use events::DecommissionEvent;
pub use guards::{AttemptHandle, AttemptOutcome, ConcurrencyGuard};
pub use persistence::{DecommissionTransition, InMemoryTransitionPersistence};
pub use states::DecommissionState;

// Common traits and utilities
pub use actions::StateAction;
pub use guards::StateGuard;
pub use persistence::TransitionPersistence;
