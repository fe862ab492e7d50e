//! Agent Loop Core
//!
//! This module implements the orchestrator: it turns a user message into a
//! reply, dispatches the model's tool calls to local handlers or to gated
//! actions, and owns the approve/reject surface of the pending queue.

pub mod core;
pub mod local_tools;
pub mod prompt;
pub mod tools;

pub use core::{AgentCore, ChatResponse, Collaborators, ConversationHistory};
pub use local_tools::LocalToolRunner;
pub use tools::{LocalTool, ToolKind, ToolSpec, TOOL_CATALOG};
