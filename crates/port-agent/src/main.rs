//! Port agent: entry point.
//!
//! Keeps one connection to an instrument (directly, or through a Digi
//! terminal server) and serves it to TCP clients on three ports:
//!
//! - **data**: drivers exchanging instrument data,
//! - **command**: operators sending port agent commands,
//! - **sniffer**: passive observers of all traffic.
//!
//! # Usage
//!
//! ```text
//! port-agent [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>                TOML configuration file
//!       --kind <tcp|digi>              Upstream arrangement
//!       --instrument-host <HOST>       Instrument or terminal server host
//!       --instrument-port <PORT>       Instrument data port
//!       --instrument-command-port <PORT>  Terminal server command port
//!       --bind <IP>                    Address the client listeners bind to
//!       --data-port <PORT>             Client data port
//!       --command-port <PORT>          Client command port
//!       --sniffer-port <PORT>          Client sniffer port
//!       --log-level <FILTER>           Log filter when RUST_LOG is unset
//!       --dump-config                  Print the effective config and exit
//! ```
//!
//! Every option can also be set through a `PORT_AGENT_*` environment
//! variable.  Precedence: command line, then environment, then config file,
//! then built-in defaults.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use port_agent::application::Router;
use port_agent::domain::{AgentConfig, AgentKind};
use port_agent::infrastructure::{start_agent, Shutdown};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Instrument port agent.
#[derive(Debug, Parser)]
#[command(
    name = "port-agent",
    about = "Keeps one instrument connection alive and fans it out to TCP clients",
    version
)]
struct Cli {
    /// TOML configuration file.  Missing fields take their defaults.
    #[arg(short, long, env = "PORT_AGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Upstream arrangement: `tcp` or `digi`.
    #[arg(long, env = "PORT_AGENT_KIND")]
    kind: Option<AgentKind>,

    /// Host of the instrument, or of the terminal server in front of it.
    #[arg(long, env = "PORT_AGENT_INSTRUMENT_HOST")]
    instrument_host: Option<String>,

    /// Instrument data port.
    #[arg(long, env = "PORT_AGENT_INSTRUMENT_PORT")]
    instrument_port: Option<u16>,

    /// Terminal server command port (digi only).
    #[arg(long, env = "PORT_AGENT_INSTRUMENT_COMMAND_PORT")]
    instrument_command_port: Option<u16>,

    /// IP address the client listeners bind to.
    #[arg(long, env = "PORT_AGENT_BIND")]
    bind: Option<String>,

    /// Port for data clients.
    #[arg(long, env = "PORT_AGENT_DATA_PORT")]
    data_port: Option<u16>,

    /// Port for command clients.
    #[arg(long, env = "PORT_AGENT_COMMAND_PORT")]
    command_port: Option<u16>,

    /// Port for sniffer clients.
    #[arg(long, env = "PORT_AGENT_SNIFFER_PORT")]
    sniffer_port: Option<u16>,

    /// Log filter used when `RUST_LOG` is not set (e.g. `debug`).
    #[arg(long, env = "PORT_AGENT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    dump_config: bool,
}

impl Cli {
    /// Loads the config file (if any) and layers the command-line overrides
    /// on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// result does not validate.
    fn into_agent_config(self) -> anyhow::Result<AgentConfig> {
        let mut config = match &self.config {
            Some(path) => AgentConfig::load(path)
                .with_context(|| format!("cannot load config from {}", path.display()))?,
            None => AgentConfig::default(),
        };

        if let Some(kind) = self.kind {
            config.agent.kind = kind;
        }
        if let Some(level) = self.log_level {
            config.agent.log_level = level;
        }
        if let Some(host) = self.instrument_host {
            config.instrument.host = host;
        }
        if let Some(port) = self.instrument_port {
            config.instrument.data_port = port;
        }
        if let Some(port) = self.instrument_command_port {
            config.instrument.command_port = port;
        }
        if let Some(bind) = self.bind {
            config.listen.bind_address = bind;
        }
        if let Some(port) = self.data_port {
            config.listen.data_port = port;
        }
        if let Some(port) = self.command_port {
            config.listen.command_port = port;
        }
        if let Some(port) = self.sniffer_port {
            config.listen.sniffer_port = port;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Runs the agent on a single-threaded runtime: all accepts, endpoint
/// construction and reconnect timers share one event loop.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let dump = cli.dump_config;
    let config = cli.into_agent_config()?;

    if dump {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.agent.log_level)),
        )
        .init();

    info!(
        kind = %config.agent.kind,
        instrument = %config.instrument_address(config.instrument.data_port),
        "port agent starting"
    );

    let shutdown = Shutdown::new();
    let running = start_agent(&config, Arc::new(Router::new()), &shutdown).await?;

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C; shutting down"),
        Err(e) => error!("failed to listen for Ctrl+C: {e}"),
    }
    shutdown.trigger();
    running.join().await;

    info!("port agent stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
