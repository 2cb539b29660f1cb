//! script-host - supervise script workers behind one session socket.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use script_host::config::{ConfigError, ConfigLoader, HostConfig};
use script_host::display;
use script_host::ipc::ChannelError;
use script_host::programs::{self, EchoOptions};
use script_host::protocol::{
    EventAddress, OutboundFrame, RUN_SCRIPT, SCRIPT_ENDED, SCRIPT_ERROR, SCRIPT_LOG,
    SCRIPT_RELOADED, SESSION_ENDED, SESSION_LOG, STOP_SCRIPT, STOP_SESSION, WATCH_SCRIPT,
};
use script_host::transport::{HostClient, HostServer, TransportError};

/// How long `run` waits for the host to acknowledge the start.
const START_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(
    name = "script-host",
    about = "Supervise script workers and multiplex their events over one session socket",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use this config file instead of searching for one.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve sessions on a Unix socket.
    Serve {
        /// Socket path (overrides the config).
        #[arg(short, long)]
        socket: Option<PathBuf>,
        /// Scripts directory (overrides the config).
        #[arg(long)]
        scripts: Option<PathBuf>,
    },
    /// Start a script on a running host and follow its output.
    Run {
        /// Script name, optionally with parameters: "name|--flag value".
        script: String,
        /// Socket path (overrides the config).
        #[arg(short, long)]
        socket: Option<PathBuf>,
        /// Reload the script when its file changes.
        #[arg(short, long)]
        watch: bool,
        /// Print payloads without truncation.
        #[arg(long)]
        raw: bool,
    },
    /// Dependency installation worker (started by the host).
    #[command(hide = true)]
    InstallWorker,
    /// Sample worker that echoes events back.
    EchoWorker {
        /// Ignore quit/kill events; only a forced kill ends it.
        #[arg(long)]
        stubborn: bool,
        /// Launch parameters reported in the ready event.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("{0}")]
    Host(String),
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<HostConfig, ConfigError> {
    match path {
        Some(path) => ConfigLoader::with_path(path).load(),
        None => ConfigLoader::new().load(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            eprintln!("script-host: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode, CliError> {
    match cli.command {
        Commands::Serve { socket, scripts } => {
            let mut config = load_config(cli.config)?;
            if let Some(socket) = socket {
                config.session.socket_path = socket;
            }
            if let Some(scripts) = scripts {
                config.scripts.dir = scripts;
            }
            serve(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            script,
            socket,
            watch,
            raw,
        } => {
            let config = load_config(cli.config)?;
            let socket = socket.unwrap_or(config.session.socket_path);
            run(&socket, &script, watch, raw).await
        }
        Commands::InstallWorker => {
            programs::install::run().await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::EchoWorker { stubborn, args } => {
            let code = programs::echo::run(EchoOptions { stubborn, args }).await?;
            Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
        }
    }
}

async fn serve(config: HostConfig) -> Result<(), CliError> {
    tracing::info!(
        socket = %config.session.socket_path.display(),
        scripts = %config.scripts.dir.display(),
        "Starting script host"
    );
    let server = HostServer::from_config(config);
    let handle = server.start()?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
    }
    handle.shutdown();
    Ok(())
}

/// Start one script and print its output until it ends.
async fn run(
    socket: &std::path::Path,
    script: &str,
    watch: bool,
    raw: bool,
) -> Result<ExitCode, CliError> {
    let mut client = HostClient::connect(socket).await?;

    let ack = client.emit_with_ack(RUN_SCRIPT, json!(script)).await?;
    let id = loop {
        match client.next_frame_timeout(START_TIMEOUT).await? {
            Some(OutboundFrame::Ack { ack: got, args }) if got == ack => {
                let id = args
                    .first()
                    .and_then(Value::as_u64)
                    .and_then(|id| u32::try_from(id).ok())
                    .ok_or_else(|| CliError::Host("host returned no worker id".to_string()))?;
                break id;
            }
            Some(OutboundFrame::Event { event, payload }) if event == SESSION_LOG => {
                let message = display::format_payload(&payload, true);
                if message.starts_with("Failed to start") {
                    return Err(CliError::Host(message));
                }
                display::print_session(&message);
            }
            Some(_) => {}
            None => return Err(TransportError::Closed.into()),
        }
    };

    let name = script.split('|').next().unwrap_or(script).trim();
    display::print_worker_started(id, name);
    if watch {
        client.emit_with_ack(WATCH_SCRIPT, json!(name)).await?;
    }

    let mut current = id;
    let mut alive = true;
    let mut stopping = false;
    let mut failed = false;
    loop {
        let frame = tokio::select! {
            frame = client.next_frame() => frame?,
            _ = tokio::signal::ctrl_c() => {
                if alive && !stopping {
                    stopping = true;
                    client.emit(STOP_SCRIPT, json!(current)).await?;
                    continue;
                }
                client.emit(STOP_SESSION, json!("interrupted")).await?;
                return Ok(ExitCode::SUCCESS);
            }
        };
        let (event, payload) = match frame {
            Some(OutboundFrame::Event { event, payload }) => (event, payload),
            Some(OutboundFrame::Ack { .. }) => continue,
            None => return Err(TransportError::Closed.into()),
        };

        match event.as_str() {
            SCRIPT_LOG => {
                if let Some((message, from)) = log_parts(&payload) {
                    if from == current {
                        display::print_worker_log(from, &message);
                    }
                }
            }
            SCRIPT_ERROR => {
                failed = true;
                display::print_worker_error(&display::format_payload(&payload, true));
            }
            SCRIPT_RELOADED => {
                if let Some((old, new)) = reload_parts(&payload) {
                    if old == current {
                        display::print_reloaded(old, new);
                        current = new;
                        alive = true;
                        failed = false;
                    }
                }
            }
            SCRIPT_ENDED => {
                if payload.as_u64() == Some(u64::from(current)) {
                    display::print_worker_ended(current, failed);
                    alive = false;
                    // With --watch the old worker ends before its reload.
                    if watch && !stopping {
                        continue;
                    }
                    client.emit(STOP_SESSION, json!("script ended")).await?;
                    return Ok(if failed {
                        ExitCode::FAILURE
                    } else {
                        ExitCode::SUCCESS
                    });
                }
            }
            SESSION_ENDED => return Ok(ExitCode::SUCCESS),
            SESSION_LOG => display::print_session(&display::format_payload(&payload, true)),
            other => {
                if let EventAddress::Targeted { id: from, event } = EventAddress::parse(other) {
                    if from == current {
                        display::print_worker_event(from, event, &payload, raw);
                    }
                }
            }
        }
    }
}

fn reload_parts(payload: &Value) -> Option<(u32, u32)> {
    let parts = payload.as_array()?;
    let old = u32::try_from(parts.first()?.as_u64()?).ok()?;
    let new = u32::try_from(parts.get(1)?.as_u64()?).ok()?;
    Some((old, new))
}

fn log_parts(payload: &Value) -> Option<(String, u32)> {
    let parts = payload.as_array()?;
    let message = parts.first()?.as_str()?.to_string();
    let id = u32::try_from(parts.get(1)?.as_u64()?).ok()?;
    Some((message, id))
}
