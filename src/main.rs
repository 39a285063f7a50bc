use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{debug, error};

use claude_relay::client::{ConnectionState, StreamSubscriber, SubscriberOptions};
use claude_relay::config::RelayConfig;
use claude_relay::server::RelayServer;
use claude_relay::subprocess::ClaudeStreamRunner;

/// Stream Claude CLI output to browser viewers over a local WebSocket
#[derive(Parser)]
#[command(name = "claude-relay")]
#[command(about = "Relay streaming Claude CLI output to connected viewers", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the WebSocket relay server (development mode only)
    Serve {
        /// Port to listen on (default: 3001)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one prompt through the Claude CLI, relaying output live
    Run {
        /// The prompt to send
        prompt: String,

        /// Working directory for the CLI invocation
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Operation label attached to relayed records
        #[arg(long, default_value = "generate")]
        operation: String,
    },
    /// Attach to a running relay and print its log stream
    Tail {
        /// WebSocket URL (default: derived from the configured port)
        #[arg(long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    // Keep stdout clean for command output; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .with_writer(std::io::stderr)
        .init();

    let code = match run(cli.command).await {
        Ok(()) => 0,
        Err(e) => {
            error!("{e}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(command: Commands) -> anyhow::Result<()> {
    let mut config = RelayConfig::from_env()?;
    debug!(mode = config.mode.as_str(), port = config.port, "relay config");

    match command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            let server = RelayServer::new(config)?;
            server.serve().await?;
        }
        Commands::Run {
            prompt,
            cwd,
            timeout,
            operation,
        } => {
            if let Some(secs) = timeout {
                config.timeout = Duration::from_secs(secs);
            }

            // Viewers may attach while the invocation is in flight.
            let server = RelayServer::new(config.clone())?;
            let logger = server.logger().clone();
            tokio::spawn(async move {
                if let Err(e) = server.serve().await {
                    error!("relay server stopped: {e}");
                }
            });

            let runner = ClaudeStreamRunner::new(logger, &config);
            let text = runner
                .generate(&prompt, &operation, cwd.as_deref())
                .await?;
            println!("{text}");
        }
        Commands::Tail { url } => {
            let mut options = SubscriberOptions::from_config(&config);
            if let Some(url) = url {
                options.url = url;
            }

            let mut subscriber = StreamSubscriber::new(options);
            let mut entries = subscriber.entries().await;
            subscriber.connect()?;

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            loop {
                tokio::select! {
                    _ = &mut ctrl_c => break,
                    entry = entries.recv() => match entry {
                        Some(entry) => {
                            println!("[{}] {}", entry.event, entry.message);
                            if subscriber.state().await == ConnectionState::Failed {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            subscriber.disconnect().await;
        }
    }

    Ok(())
}
