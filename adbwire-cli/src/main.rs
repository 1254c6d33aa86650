//! CLI for talking to a running ADB server.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod device;
mod track;

use adbwire::{Client, Connector, Device, DeviceState, ENV_SERVER_ADDRESS, ENV_SERVER_PORT, TcpAddress};
use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "adbwire", version, about = "Android Debug Bridge host-protocol client")]
struct Cli {
    /// ADB server host.
    #[arg(long, global = true, env = ENV_SERVER_ADDRESS, default_value = "localhost")]
    host: String,

    /// ADB server port.
    #[arg(long, global = true, env = ENV_SERVER_PORT, default_value_t = 5037)]
    port: u16,

    /// Target device serial (default: the only attached device).
    #[arg(short = 's', long, global = true)]
    serial: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` wins.
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the server's protocol version.
    Version,

    /// List attached devices with their state.
    Devices {
        /// Output format.
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },

    /// Print the connection state of the target device.
    State,

    /// Run a command through the legacy shell service.
    Shell(device::CommandArgs),

    /// Run a command through the exec service (raw, binary-safe output).
    Exec(device::CommandArgs),

    /// List a remote directory.
    Ls(device::LsArgs),

    /// Upload a local file.
    Push(device::PushArgs),

    /// Download a remote file.
    Pull(device::PullArgs),

    /// Attach a device listening on TCP.
    Connect {
        /// Device address (`host:port`).
        address: TcpAddress,
    },

    /// Detach a TCP device.
    Disconnect {
        /// Device address (`host:port`).
        address: TcpAddress,
    },

    /// Print the device list on every change until interrupted.
    Track {
        /// Output format.
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },

    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completion {
        /// Target shell.
        shell: Shell,
    },
}

/// Output format for list commands.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable table.
    #[default]
    Table,
    /// Machine-readable JSON.
    Json,
}

/// A device and its state, as printed by `devices` and `track`.
#[derive(Serialize)]
pub(crate) struct DeviceRow {
    serial: String,
    state: DeviceState,
}

impl DeviceRow {
    /// Queries the state of each device; failures show as `unknown`.
    pub(crate) fn collect(devices: &[Device]) -> Vec<Self> {
        devices
            .iter()
            .map(|d| Self {
                serial: d.serial().unwrap_or_default().to_owned(),
                state: d.state().unwrap_or_else(|e| {
                    tracing::warn!("state of {d} unavailable: {e}");
                    DeviceState::Unknown
                }),
            })
            .collect()
    }

    pub(crate) fn print(rows: &[Self], format: OutputFormat) -> Result<()> {
        if matches!(format, OutputFormat::Json) {
            println!("{}", serde_json::to_string_pretty(rows)?);
            return Ok(());
        }
        if rows.is_empty() {
            println!("No devices.");
            return Ok(());
        }
        println!("{:<24} STATE", "SERIAL");
        for row in rows {
            println!("{:<24} {}", row.serial, row.state);
        }
        Ok(())
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = cli.dispatch() {
        eprintln!("adbwire: {e:#}");
        std::process::exit(1);
    }
}

/// Installs a stderr subscriber; `RUST_LOG` overrides `-v`.
fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "adbwire=debug,warn",
        _ => "adbwire=trace,debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

impl Cli {
    fn dispatch(self) -> Result<()> {
        let client = Client::new(Connector::new(self.host, self.port));
        let target = match self.serial {
            Some(serial) => client.device(serial),
            None => client.any_device(),
        };

        match self.command {
            Command::Version => {
                let version = client
                    .host_version()
                    .with_context(|| format!("querying {}", client.connector()))?;
                println!("{version}");
                Ok(())
            }
            Command::Devices { format } => {
                let devices = client.devices().context("listing devices")?;
                DeviceRow::print(&DeviceRow::collect(&devices), format)
            }
            Command::State => {
                println!("{}", target.state().with_context(|| format!("state of {target}"))?);
                Ok(())
            }
            Command::Shell(args) => device::shell(&target, &args),
            Command::Exec(args) => device::exec(&target, &args),
            Command::Ls(args) => device::ls(&target, &args),
            Command::Push(args) => device::push(&target, &args),
            Command::Pull(args) => device::pull(&target, &args),
            Command::Connect { address } => {
                let connected = client
                    .connect_to_tcp_device(&address)
                    .with_context(|| format!("connecting to {address}"))?;
                println!("connected to {connected}");
                Ok(())
            }
            Command::Disconnect { address } => {
                let gone = client
                    .disconnect_from_tcp_device(&address)
                    .with_context(|| format!("disconnecting from {address}"))?;
                println!("disconnected {gone}");
                Ok(())
            }
            Command::Track { format } => track::run(&client, format),
            Command::Completion { shell } => {
                clap_complete::generate(
                    shell,
                    &mut Self::command(),
                    "adbwire",
                    &mut std::io::stdout(),
                );
                Ok(())
            }
        }
    }
}
