//! CLI command handling.
//!
//! Provides subcommands for:
//! - Starting a preset service and printing where it listens (`start`)
//! - Tearing a container down (`stop`)
//! - Waiting for an address to accept connections (`wait`)
//! - Listing the known presets (`presets`)

use std::time::Duration;

use clap::{ColorChoice, Parser, Subcommand};

use crate::config::FixtureConfig;
use crate::container::ContainerId;
use crate::presets::Preset;
use crate::probe::{CancelToken, await_reachable_cancellable};
use crate::provision::Provisioner;

#[derive(Parser, Debug)]
#[command(name = "fixturebox")]
#[command(about = "Disposable containerized services for tests")]
#[command(
    long_about = "Starts throwaway databases, brokers and log collectors in containers.\nExamples:\n  fixturebox start redis\n  fixturebox start postgres --database shop\n  fixturebox stop <id>"
)]
#[command(version)]
#[command(color = ColorChoice::Auto)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a preset service and print its id and address as JSON
    #[command(
        about = "Start a preset service",
        long_about = "Starts a preset and waits until it accepts connections.\nExtra `run` options go after `--`.\nExample: fixturebox start mysql --database shop -- --tmpfs /var/lib/mysql"
    )]
    Start {
        /// Preset name (see `fixturebox presets`)
        preset: Preset,

        /// Database to create (mysql, postgres)
        #[arg(short, long)]
        database: Option<String>,

        /// Extra options for the engine's `run`
        #[arg(last = true)]
        extra_args: Vec<String>,
    },

    /// Kill and remove a container
    Stop {
        /// Container id printed by `start`
        id: String,
    },

    /// Wait until a TCP address accepts connections
    Wait {
        /// Address as host:port
        address: String,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },

    /// List the available presets
    Presets,
}

/// Run a CLI command.
pub async fn run_command(command: Command, config: FixtureConfig) -> anyhow::Result<()> {
    match command {
        Command::Start {
            preset,
            database,
            extra_args,
        } => run_start(config, preset, database.as_deref(), &extra_args).await,
        Command::Stop { id } => run_stop(config, &id).await,
        Command::Wait {
            address,
            timeout_secs,
        } => run_wait(&address, Duration::from_secs(timeout_secs)).await,
        Command::Presets => {
            print!("{}", render_presets());
            Ok(())
        }
    }
}

async fn run_start(
    config: FixtureConfig,
    preset: Preset,
    database: Option<&str>,
    extra_args: &[String],
) -> anyhow::Result<()> {
    let provisioner = Provisioner::new(config);
    let extra: Vec<&str> = extra_args.iter().map(String::as_str).collect();

    let container = provisioner.provision_preset(preset, database, &extra).await?;
    let summary = container.summary();
    // The container outlives this process; `stop` tears it down.
    let _ = container.into_id();

    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

async fn run_stop(config: FixtureConfig, id: &str) -> anyhow::Result<()> {
    let provisioner = Provisioner::new(config);
    provisioner.teardown(&ContainerId::new(id)).await?;
    tracing::info!("Stopped container {}", id);
    Ok(())
}

async fn run_wait(address: &str, timeout: Duration) -> anyhow::Result<()> {
    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let result = await_reachable_cancellable(address, timeout, &cancel).await;
    watcher.abort();
    result?;

    println!("{address} is reachable");
    Ok(())
}

fn render_presets() -> String {
    let mut out = String::new();
    for preset in Preset::all() {
        out.push_str(&format!(
            "{:<15} {:<25} {}\n",
            preset.name(),
            preset.image(),
            preset.container_port()
        ));
    }
    out
}
