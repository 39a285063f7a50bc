//! Subprocess invocation with real-time output relay
//!
//! One invocation spawns the external CLI, frames its stdout into records
//! as chunks arrive, broadcasts each record to viewers, and resolves to the
//! extracted final text once the process exits.

pub mod builder;
pub mod claude;
pub mod error;
pub mod runner;

pub use builder::ProcessCommandBuilder;
pub use claude::ClaudeStreamRunner;
pub use error::ProcessError;
pub use runner::{InvocationResult, ProcessCommand, StreamingRunner};
