//! Writing style conformance for outgoing email

pub mod prompts;
pub mod refiner;
pub mod scorer;
pub mod store;

pub use refiner::{StyleDraftArgs, StyleRefiner, StyledDraft};
pub use scorer::{DraftScorer, HeuristicScorer};
pub use store::{FileStyleProfileStore, StyleProfileStore};
