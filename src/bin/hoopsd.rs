//! hoops relay daemon - Connection registry and broadcast server
//!
//! This binary runs the WebSocket relay that keeps scoreboard and leaderboard
//! screens in sync: every message a client sends is rebroadcast to every
//! connected client.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! hoopsd start
//!
//! # Start the daemon (background/daemonized) on another port
//! hoopsd start -d --port 6000
//!
//! # Stop the daemon
//! hoopsd stop
//!
//! # Check daemon status
//! hoopsd status
//! ```

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hoopsd::config::RelayConfig;
use hoopsd::hub::spawn_hub;
use hoopsd::registry::spawn_registry;
use hoopsd::server::RelayServer;

/// hoops relay daemon - real-time refresh notifications
#[derive(Parser, Debug)]
#[command(name = "hoopsd", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start(StartArgs),
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status {
        /// Configuration file used to report the listen address
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Default)]
struct StartArgs {
    /// Run as a background daemon (fork to background)
    #[arg(short = 'd', long)]
    daemon: bool,

    /// Configuration file (defaults to <config dir>/hoops/relay.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host address to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("hoops")
}

fn pid_file_path() -> PathBuf {
    state_dir().join("hoopsd.pid")
}

fn log_file_path() -> PathBuf {
    state_dir().join("hoopsd.log")
}

fn read_pid() -> Option<u32> {
    let path = pid_file_path();
    let mut file = File::open(&path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let path = pid_file_path();
    let _ = fs::remove_file(path);
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        remove_pid_file();
    }
    None
}

fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

/// Loads file and environment settings, then applies CLI flags and validates.
fn load_config(args: &StartArgs) -> Result<RelayConfig> {
    let mut config =
        RelayConfig::load(args.config.as_deref()).context("Failed to load relay configuration")?;

    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    config.validate().context("Invalid relay configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Command::Start(StartArgs::default()));

    match command {
        Command::Start(args) => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'hoopsd stop' to stop it first.");
                process::exit(1);
            }

            // Config errors should reach the terminal, so load before forking.
            let config = load_config(&args)?;

            if args.daemon {
                daemonize()?;
            }

            write_pid()?;

            let result = run_daemon(config);

            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping daemon (PID {pid})...");
                stop_daemon(pid)?;

                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status { config } => {
            if let Some(pid) = is_daemon_running() {
                println!("Daemon is running (PID {pid})");

                if let Ok(config) = RelayConfig::load(config.as_deref()) {
                    let (host, port) = config.bind_addr();
                    println!("Listening: ws://{host}:{port}");
                }
                println!("Log: {}", log_file_path().display());

                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
    }
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    let daemonize = Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr);

    daemonize.start().context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_daemon(config: RelayConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("hoopsd=info".parse()?)
                .add_directive("hoops_core=info".parse()?)
                .add_directive("hoops_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "hoops relay starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = spawn_registry(config.max_connections);
    info!(max_connections = config.max_connections, "Connection registry started");

    let hub = spawn_hub(registry.clone(), config.write_timeout(), config.dispatch_buffer);

    let server = RelayServer::bind(&config, registry, hub, cancel_token)
        .await
        .context("Failed to start relay server")?;

    info!(addr = %server.local_addr(), "Starting server");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("hoops relay stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
