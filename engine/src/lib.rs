//! Semblance Engine Library
//!
//! This library provides the orchestration core of the Semblance assistant.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Database persistence module
pub mod db;

/// LLM provider abstraction layer
pub mod llm;

/// Knowledge search collaborator
pub mod knowledge;

/// Action execution transport
pub mod executor;

/// Approval pattern tracking
pub mod approval;

/// Autonomy decision engine
pub mod autonomy;

/// Writing style refinement
pub mod style;

/// Agent loop core module
pub mod agent;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
