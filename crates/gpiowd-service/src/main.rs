//! gpiowdd - GPIO watchdog supervisor daemon and client

#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gpiowd_service::{
    Client, DEFAULT_CONFIG_PATH, DEFAULT_SOCKET_PATH, ServiceConfig, ServiceError, SocketHost,
    init_logging,
};
use gpiowd_supervisor::{
    Activation, GROUP_NAME, LineProvider, SupervisorError, Timebase, sim::SimLineProvider,
};
use gpiowd_sysfs::SysfsGpio;
use tracing::{debug, error, info};

#[derive(Parser)]
#[command(name = "gpiowdd")]
#[command(about = "Supervise an external hardware watchdog over GPIO lines")]
#[command(version)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file
    #[arg(long, global = true, env = "GPIOWD_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Endpoint socket, overriding the configuration
    #[arg(long, global = true, env = "GPIOWD_SOCKET")]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the supervisor and serve its endpoints
    Serve {
        /// Use simulated lines instead of sysfs GPIO
        #[arg(long)]
        simulate: bool,
    },

    /// Read an endpoint (inhib, clock, remaining_time)
    Read { endpoint: String },

    /// Write a value to an endpoint (trig)
    Write { endpoint: String, value: String },

    /// Show the supervisor status snapshot
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute_command(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("gpiowdd: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(service) = err.downcast_ref::<ServiceError>() {
        return service.exit_code();
    }
    match err.downcast_ref::<SupervisorError>() {
        Some(e) if e.is_configuration() => 2,
        _ => 1,
    }
}

async fn execute_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Serve { simulate } => serve(&cli.config, cli.socket.as_deref(), *simulate).await,
        Commands::Read { endpoint } => {
            let client = client_for(cli).await;
            print!("{}", client.read(GROUP_NAME, endpoint).await?);
            Ok(())
        }
        Commands::Write { endpoint, value } => {
            let client = client_for(cli).await;
            let payload = format!("{value}\n");
            client.write(GROUP_NAME, endpoint, payload.as_bytes()).await?;
            Ok(())
        }
        Commands::Status => {
            let client = client_for(cli).await;
            let status = client.status(GROUP_NAME).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
    }
}

/// Client commands fall back to the default socket when the configuration
/// cannot be read (typically an unprivileged user).
async fn client_for(cli: &Cli) -> Client {
    if let Some(socket) = &cli.socket {
        return Client::new(socket);
    }
    match ServiceConfig::load_from_path(&cli.config).await {
        Ok(config) => Client::new(config.socket_path),
        Err(e) => {
            debug!(
                error = %format!("{e:#}"),
                socket = DEFAULT_SOCKET_PATH,
                "Configuration unreadable, using default socket"
            );
            Client::new(DEFAULT_SOCKET_PATH)
        }
    }
}

async fn serve(config_path: &Path, socket: Option<&Path>, simulate: bool) -> Result<()> {
    let mut config = ServiceConfig::load_from_path(config_path).await?;
    if let Some(socket) = socket {
        config.socket_path = socket.to_path_buf();
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        simulate,
        "Starting gpiowdd"
    );

    if simulate {
        let board = SimLineProvider::new();
        if let Some(clock_line) = config.supervisor.clock_line {
            board.toggle_on_read(clock_line, true);
        }
        run(&board, &config).await
    } else {
        run(&SysfsGpio::with_root(&config.sysfs_root), &config).await
    }
}

async fn run<P>(provider: &P, config: &ServiceConfig) -> Result<()>
where
    P: LineProvider,
    P::Line: 'static,
{
    let mut host = SocketHost::bind(&config.socket_path).await?;

    let activation =
        match Activation::activate(provider, &config.supervisor, Timebase::system(), &mut host) {
            Ok(activation) => activation,
            Err(e) => {
                host.close().await?;
                return Err(e).context("Failed to activate watchdog supervisor");
            }
        };

    wait_for_shutdown().await?;
    info!("Shutting down");

    let (registration, supervisor) = activation.into_parts();
    drop(registration);
    host.close().await?;
    drop(supervisor);

    info!("gpiowdd stopped");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn parse_serve_defaults() -> TestResult {
        let cli = Cli::try_parse_from(["gpiowdd", "serve"])?;
        assert_eq!(cli.verbose, 0);
        assert!(cli.socket.is_none());
        assert!(matches!(cli.command, Commands::Serve { simulate: false }));
        Ok(())
    }

    #[test]
    fn parse_serve_simulate_with_config() -> TestResult {
        let cli = Cli::try_parse_from([
            "gpiowdd",
            "-vv",
            "serve",
            "--simulate",
            "--config",
            "/tmp/wd.json",
        ])?;
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, PathBuf::from("/tmp/wd.json"));
        assert!(matches!(cli.command, Commands::Serve { simulate: true }));
        Ok(())
    }

    #[test]
    fn parse_write() -> TestResult {
        let cli = Cli::try_parse_from(["gpiowdd", "--socket", "/tmp/wd.sock", "write", "trig", "1"])?;
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/wd.sock")));
        assert!(matches!(
            cli.command,
            Commands::Write { ref endpoint, ref value } if endpoint == "trig" && value == "1"
        ));
        Ok(())
    }

    #[test]
    fn parse_rejects_missing_endpoint() {
        assert!(Cli::try_parse_from(["gpiowdd", "read"]).is_err());
    }

    #[test]
    fn configuration_errors_exit_with_two() {
        let err = anyhow::Error::new(ServiceError::InvalidConfiguration("x".into()));
        assert_eq!(exit_code(&err), 2);

        let err = anyhow::Error::new(SupervisorError::configuration("period_secs is zero"))
            .context("Failed to activate watchdog supervisor");
        assert_eq!(exit_code(&err), 2);

        let err = anyhow::Error::new(SupervisorError::InvalidLine {
            label: "wd-clock",
            line: 900,
        })
        .context("Failed to activate watchdog supervisor");
        assert_eq!(exit_code(&err), 2);

        let err = anyhow::Error::new(SupervisorError::registration("busy"));
        assert_eq!(exit_code(&err), 1);
    }

    #[tokio::test]
    async fn client_uses_configured_socket() -> TestResult {
        let dir = tempfile::tempdir()?;
        let config_path = dir.path().join("config.json");
        let socket = dir.path().join("wd.sock");
        let mut config = ServiceConfig::new(gpiowd_supervisor::SupervisorConfig::new(1, 2, 3, 60));
        config.socket_path = socket.clone();
        tokio::fs::write(&config_path, serde_json::to_string(&config)?).await?;

        let cli = Cli::try_parse_from(["gpiowdd", "--config", path_str(&config_path)?, "status"])?;
        assert_eq!(client_for(&cli).await.socket_path(), socket.as_path());
        Ok(())
    }

    #[tokio::test]
    async fn client_falls_back_to_default_socket_on_bad_config() -> TestResult {
        let dir = tempfile::tempdir()?;
        let config_path = dir.path().join("config.json");
        tokio::fs::write(&config_path, "{ not json").await?;

        let cli = Cli::try_parse_from(["gpiowdd", "--config", path_str(&config_path)?, "status"])?;
        assert_eq!(
            client_for(&cli).await.socket_path(),
            Path::new(DEFAULT_SOCKET_PATH)
        );
        Ok(())
    }

    fn path_str(path: &Path) -> Result<&str, Box<dyn std::error::Error>> {
        path.to_str().ok_or_else(|| "temporary path is not UTF-8".into())
    }
}
