//! Claude CLI invocation

use std::path::Path;
use std::time::Duration;

use super::builder::ProcessCommandBuilder;
use super::error::ProcessError;
use super::runner::StreamingRunner;
use crate::config::RelayConfig;
use crate::relay::StreamLogger;

/// Drives one `claude -p <prompt> --output-format stream-json` invocation,
/// relaying its output to viewers and returning the final response text.
pub struct ClaudeStreamRunner {
    runner: StreamingRunner,
    logger: StreamLogger,
    binary: String,
    timeout: Duration,
}

impl ClaudeStreamRunner {
    pub fn new(logger: StreamLogger, config: &RelayConfig) -> Self {
        Self {
            runner: StreamingRunner::new(logger.clone()),
            logger,
            binary: config.claude_binary.clone(),
            timeout: config.timeout,
        }
    }

    /// Whether the CLI is installed at all. A missing binary is an answer,
    /// not an error.
    pub async fn check_availability(&self) -> Result<bool, ProcessError> {
        let result = tokio::process::Command::new(&self.binary)
            .arg("--version")
            .output()
            .await;

        match result {
            Ok(output) => Ok(output.status.success()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ProcessError::Io(e)),
        }
    }

    pub async fn generate(
        &self,
        prompt: &str,
        operation: &str,
        project_path: Option<&Path>,
    ) -> Result<String, ProcessError> {
        match project_path {
            Some(path) => {
                self.logger
                    .info(
                        &format!(
                            "[streaming] {operation} - analyzing (project: {})",
                            path.display()
                        ),
                        None,
                    )
                    .await
            }
            None => {
                self.logger
                    .info(&format!("[streaming] {operation} - analyzing"), None)
                    .await
            }
        }

        let mut builder = ProcessCommandBuilder::new(&self.binary)
            .arg("-p")
            .arg(prompt)
            .args(["--output-format", "stream-json"])
            .timeout(self.timeout);
        if let Some(path) = project_path {
            builder = builder.current_dir(path);
        }

        let result = self.runner.run(builder.build(), operation).await?;
        Ok(result.text())
    }
}
