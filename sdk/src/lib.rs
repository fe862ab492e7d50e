//! Semblance SDK
//!
//! Shared library providing the data model and error types used by the
//! engine and by anything that talks to it (approval UI, action gateway).

/// Agent action types and lifecycle
pub mod actions;

/// Error types and handling
pub mod errors;

/// Writing style profile and score types
pub mod style;

// Re-export commonly used types
pub use actions::{
    ActionClass, ActionOutcome, ActionStatus, ActionType, AgentAction, Domain, OutcomeStatus,
};
pub use errors::{EngineError, ErrorExt};
pub use style::{StyleDimension, StyleProfile, StyleScore};
