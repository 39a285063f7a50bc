//! # claude-relay
//!
//! Relays streaming JSON output from the Claude CLI to browser viewers in
//! real time over a local WebSocket. One subprocess invocation is framed
//! line by line, classified, and fanned out to every connected viewer as
//! it happens; on exit the stream collapses into a single best-effort
//! response text.
//!
//! The relay only operates in development mode; anywhere else it binds no
//! port, spawns nothing, and reports itself unavailable.
//!
//! ## Modules
//!
//! - `client` - reconnecting viewer-side subscriber with a bounded log
//! - `config` - runtime mode gate and relay settings
//! - `relay` - viewer registry, broadcast events, stream logger facade
//! - `server` - axum WebSocket server and status endpoints
//! - `stream` - line framing and record classification
//! - `subprocess` - streaming process runner and Claude CLI wrapper

pub mod client;
pub mod config;
pub mod error;
pub mod relay;
pub mod server;
pub mod stream;
pub mod subprocess;

pub use error::{Error, Result};
