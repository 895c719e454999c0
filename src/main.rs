use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use machine_hub::api::ApiServerBuilder;
use machine_hub::peers::PeerClient;
use machine_hub::snapshot::SnapshotStore;
use machine_hub::{Config, Hub};

/// Machine hub - coordinates machines and user queues across edge servers
#[derive(Parser)]
#[command(name = "machine-hub", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Edge server base address (repeatable or comma-separated)
    #[arg(long = "peer", value_delimiter = ',')]
    peers: Vec<String>,

    /// Snapshot file for device metadata
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Skip scanning peers at startup
    #[arg(long)]
    no_reconcile: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Query every peer once and print what it reports
    Scan,
    /// Print the resolved configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,machine_hub=info",
        1 => "info,machine_hub=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Scan => cmd_scan(&config).await,
            Command::CheckConfig => {
                cmd_check_config(&config);
                Ok(())
            }
        };
    }

    tracing::info!(
        port = config.server.port,
        peers = config.peers.len(),
        snapshot = ?config.snapshot,
        "starting machine hub"
    );

    let hub = Hub::new(config.peer_set(), config.snapshot.clone().map(SnapshotStore::new));

    if let Err(e) = hub.restore_snapshot().await {
        tracing::warn!(error = %e, "failed to restore snapshot, starting empty");
    }

    if config.reconcile_on_start {
        drop(hub.spawn_reconciliation());
    } else {
        tracing::info!("startup reconciliation disabled");
    }

    ApiServerBuilder::new(hub, config.server.port)
        .api_key(config.server.api_key.clone())
        .build()
        .run()
        .await?;

    Ok(())
}

/// Apply command-line overrides on top of file and environment
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load()?;

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if !cli.peers.is_empty() {
        config.set_peers(&cli.peers)?;
    }
    if let Some(path) = &cli.snapshot {
        config.snapshot = Some(path.clone());
    }
    if cli.no_reconcile {
        config.reconcile_on_start = false;
    }

    Ok(config)
}

/// Scan every peer once and print a summary
async fn cmd_scan(config: &Config) -> anyhow::Result<()> {
    let peers = config.peer_set();
    if peers.is_empty() {
        anyhow::bail!("no peers configured");
    }

    let client = PeerClient::new();
    let mut failed = 0;

    for peer in peers.addresses() {
        match client.scan(peer).await {
            Ok(devices) => {
                let queued: usize = devices.iter().map(|d| d.queue.len()).sum();
                println!("{peer}: {} devices, {queued} queued users", devices.len());
                for device in &devices {
                    let active = device.active().map_or("-", |e| e.session.as_str());
                    println!(
                        "  {} (owner: {}, queue: {}, active: {active})",
                        device.device_id,
                        device.owner_peer.as_deref().unwrap_or("none"),
                        device.queue.len(),
                    );
                }
            }
            Err(e) => {
                failed += 1;
                println!("{peer}: error: {e}");
            }
        }
    }

    if failed == peers.len() {
        anyhow::bail!("every peer failed to respond");
    }
    Ok(())
}

fn cmd_check_config(config: &Config) {
    println!("port: {}", config.server.port);
    println!(
        "api key: {}",
        if config.server.api_key.is_some() { "set" } else { "not set (open access)" }
    );
    println!("peers:");
    for peer in &config.peers {
        println!("  {peer}");
    }
    match &config.snapshot {
        Some(path) => println!("snapshot: {}", path.display()),
        None => println!("snapshot: disabled"),
    }
    println!("reconcile on start: {}", config.reconcile_on_start);
}
