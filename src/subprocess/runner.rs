//! Streaming subprocess runner

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use super::error::ProcessError;
use crate::relay::StreamLogger;
use crate::stream::{extract_final_text, LineFramer, StreamRecord};

#[derive(Debug, Clone)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

/// Outcome of one subprocess invocation.
///
/// Constructed empty at spawn time, finalized exactly once at process exit.
/// `records` preserves stdout arrival order end-to-end.
#[derive(Debug)]
pub struct InvocationResult {
    pub records: Vec<StreamRecord>,
    pub exit_code: Option<i32>,
    pub error_text: String,
    pub final_text: Option<String>,
}

impl InvocationResult {
    /// The extracted response, or an empty string for a silent run.
    pub fn text(&self) -> String {
        self.final_text.clone().unwrap_or_default()
    }
}

/// Runs one command to completion while relaying its stdout line by line.
///
/// Every completed line is classified and published to viewers the moment
/// it is framed; stderr is accumulated verbatim for error reporting.
#[derive(Clone)]
pub struct StreamingRunner {
    logger: StreamLogger,
}

impl StreamingRunner {
    pub fn new(logger: StreamLogger) -> Self {
        Self { logger }
    }

    pub async fn run(
        &self,
        command: ProcessCommand,
        operation: &str,
    ) -> Result<InvocationResult, ProcessError> {
        tracing::debug!(
            "Executing subprocess: {} {}",
            command.program,
            command.args.join(" ")
        );

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| map_spawn_error(e, &command.program))?;

        let stdout = child
            .stdout
            .take()
            .ok_or(ProcessError::StreamCapture("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(ProcessError::StreamCapture("stderr"))?;

        let stdout_task = spawn_record_reader(stdout, self.logger.clone(), operation.to_string());
        let stderr_task = spawn_stderr_reader(stderr);

        // Race exit against the wall clock. The timer preempts normal exit
        // handling: the child is killed once and no further stdout is
        // processed into records.
        let status = match command.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited.map_err(ProcessError::Io)?,
                Err(_) => {
                    stdout_task.abort();
                    stderr_task.abort();
                    if let Err(e) = child.kill().await {
                        tracing::warn!("failed to kill timed-out subprocess: {e}");
                    }
                    tracing::warn!(
                        %operation,
                        "subprocess timed out after {limit:?}: {}",
                        command.program
                    );
                    return Err(ProcessError::Timeout(limit));
                }
            },
            None => child.wait().await.map_err(ProcessError::Io)?,
        };

        let records = join_reader(stdout_task).await?;
        let error_text = join_reader(stderr_task).await?;

        self.logger
            .success(
                &format!(
                    "[complete] {operation} | Received {} messages",
                    records.len()
                ),
                None,
            )
            .await;

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            return Err(ProcessError::NonZeroExit {
                code,
                stderr: error_text,
            });
        }

        let final_text = extract_final_text(&records);
        if final_text.is_none() {
            self.logger
                .warning(&format!("No response found in stream for {operation}"), None)
                .await;
        }

        Ok(InvocationResult {
            records,
            exit_code: status.code(),
            error_text,
            final_text,
        })
    }
}

fn map_spawn_error(error: std::io::Error, program: &str) -> ProcessError {
    if error.kind() == std::io::ErrorKind::NotFound {
        ProcessError::CommandNotFound(program.to_string())
    } else {
        ProcessError::SpawnFailed {
            command: program.to_string(),
            source: error,
        }
    }
}

async fn join_reader<T>(task: JoinHandle<Result<T, ProcessError>>) -> Result<T, ProcessError> {
    task.await
        .map_err(|e| ProcessError::Io(std::io::Error::other(e)))?
}

fn spawn_record_reader<R>(
    stdout: R,
    logger: StreamLogger,
    operation: String,
) -> JoinHandle<Result<Vec<StreamRecord>, ProcessError>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut stdout = stdout;
        let mut framer = LineFramer::new();
        let mut records = Vec::new();
        let mut buf = [0u8; 4096];

        loop {
            let n = stdout.read(&mut buf).await.map_err(ProcessError::Io)?;
            if n == 0 {
                break;
            }
            for line in framer.feed(&buf[..n]) {
                relay_line(line, &logger, &operation, &mut records).await;
            }
        }

        // One last record for whatever the stream left unterminated.
        if let Some(rest) = framer.finish() {
            relay_line(rest, &logger, &operation, &mut records).await;
        }

        Ok(records)
    })
}

async fn relay_line(
    line: String,
    logger: &StreamLogger,
    operation: &str,
    records: &mut Vec<StreamRecord>,
) {
    if line.trim().is_empty() {
        return;
    }

    let record = StreamRecord::classify(&line);
    if record.parsed.is_some() {
        logger.stream_json(operation, &record).await;
    } else {
        // Malformed lines degrade to raw text and never abort the stream.
        logger
            .debug(
                &format!("[stream] {operation} (parse error)"),
                Some(serde_json::Value::String(line)),
            )
            .await;
    }
    records.push(record);
}

fn spawn_stderr_reader<R>(stderr: R) -> JoinHandle<Result<String, ProcessError>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut stderr = stderr;
        let mut text = String::new();
        stderr
            .read_to_string(&mut text)
            .await
            .map_err(ProcessError::Io)?;
        Ok(text)
    })
}
