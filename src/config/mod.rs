//! Relay configuration
//!
//! The development gate lives here and is checked once at startup; nothing
//! else in the crate reads the environment.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_WS_PORT: u16 = 3001;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 3;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 2000;

/// The relay only operates in development; in any other mode it binds no
/// port and spawns nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    Development,
    Production,
}

impl RuntimeMode {
    pub fn is_development(&self) -> bool {
        matches!(self, RuntimeMode::Development)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeMode::Development => "development",
            RuntimeMode::Production => "production",
        }
    }
}

impl FromStr for RuntimeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(RuntimeMode::Development),
            "production" | "prod" => Ok(RuntimeMode::Production),
            other => Err(Error::Config(format!("unknown runtime mode: {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub mode: RuntimeMode,
    pub port: u16,
    pub claude_binary: String,
    pub timeout: Duration,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode: RuntimeMode::Development,
            port: DEFAULT_WS_PORT,
            claude_binary: "claude".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
        }
    }
}

impl RelayConfig {
    /// Defaults overridden by `RELAY_MODE`, `RELAY_PORT`,
    /// `RELAY_TIMEOUT_SECS`, and `RELAY_CLAUDE_BIN`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(mode) = std::env::var("RELAY_MODE") {
            config.mode = mode.parse()?;
        }
        if let Ok(port) = std::env::var("RELAY_PORT") {
            config.port = port
                .parse()
                .map_err(|_| Error::Config(format!("invalid RELAY_PORT: {port}")))?;
        }
        if let Ok(secs) = std::env::var("RELAY_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| Error::Config(format!("invalid RELAY_TIMEOUT_SECS: {secs}")))?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Ok(binary) = std::env::var("RELAY_CLAUDE_BIN") {
            config.claude_binary = binary;
        }

        Ok(config)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://localhost:{}/ws", self.port)
    }
}
