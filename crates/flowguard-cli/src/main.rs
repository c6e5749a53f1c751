//! flowguard - flow-log incident response CLI
//!
//! ## Commands
//!
//! - `handle`: run a delivered batch through classification and remediation
//!   against an inventory file (offline rehearsal)
//! - `decode`: print the flow records carried by a delivered batch
//! - `encode`: wrap a decoded batch document into a delivery envelope
//! - `check`: evaluate one destination against the configured policy

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowguard_core::batch::{decode_batch, encode_envelope, parse_record};
use flowguard_core::telemetry::{init_tracing, LogFormat};
use flowguard_core::{build_whitelist, Config, IncidentHandler};
use flowguard_provider::{HttpRangeFeed, Inventory, MemoryCloud, RangeFeed};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "flowguard")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Remediate instances whose traffic leaves the network whitelist",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines (same as `--log-format json`)
    #[arg(long, global = true)]
    json: bool,

    /// Log line format: text or json
    #[arg(long, global = true, env = "FLOWGUARD_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Configuration file (TOML); FLOWGUARD_* environment variables override it
    #[arg(short, long, global = true, env = "FLOWGUARD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle a delivered batch against an in-memory inventory
    Handle {
        /// Raw delivery envelope (JSON)
        #[arg(short, long)]
        event: PathBuf,

        /// Inventory of instances, interfaces, volumes and ranges (JSON)
        #[arg(short, long)]
        inventory: PathBuf,

        /// Simulate every mutating call
        #[arg(long)]
        dry_run: bool,

        /// Serve provider ranges from the inventory instead of fetching them
        #[arg(long)]
        offline_feed: bool,
    },

    /// Decode a delivered batch and print its flow records
    Decode {
        /// Raw delivery envelope (JSON)
        #[arg(short, long)]
        event: PathBuf,
    },

    /// Wrap a decoded batch document (with `logEvents`) into a delivery envelope
    Encode {
        /// Decoded batch document (JSON)
        #[arg(short, long)]
        batch: PathBuf,

        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check whether a destination is allowed by the policy
    Check {
        /// Destination address
        #[arg(long)]
        addr: String,

        /// Destination port
        #[arg(long)]
        port: String,

        /// Skip provider range enrichment
        #[arg(long)]
        no_enrichment: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let format = cli
        .log_format
        .unwrap_or_else(|| LogFormat::from_json_flag(cli.json));
    init_tracing(format, level);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Handle {
            event,
            inventory,
            dry_run,
            offline_feed,
        } => cmd_handle(config, &event, &inventory, dry_run, offline_feed).await,
        Commands::Decode { event } => cmd_decode(&event),
        Commands::Encode { batch, output } => cmd_encode(&batch, output.as_deref()),
        Commands::Check {
            addr,
            port,
            no_enrichment,
        } => cmd_check(config, &addr, &port, no_enrichment).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => Config::from_env().context("Invalid FLOWGUARD_* environment"),
    }
}

fn http_feed(config: &Config) -> Result<Arc<dyn RangeFeed>> {
    let feed = HttpRangeFeed::new(config.call_timeout())
        .context("Failed to build HTTP client for range feed")?
        .with_ipv6(config.enrichment_include_ipv6);
    Ok(Arc::new(feed))
}

async fn cmd_handle(
    mut config: Config,
    event: &Path,
    inventory: &Path,
    dry_run: bool,
    offline_feed: bool,
) -> Result<()> {
    config.dry_run |= dry_run;

    let raw: Value = read_json_file(event)?;
    let inventory_text = std::fs::read_to_string(inventory)
        .with_context(|| format!("Failed to read inventory: {:?}", inventory))?;
    let inventory = Inventory::from_json(&inventory_text)
        .with_context(|| format!("Invalid inventory in {:?}", inventory))?;

    let cloud = Arc::new(MemoryCloud::new(inventory));
    let mut handler = IncidentHandler::with_provider(config.clone(), cloud.clone())
        .context("Invalid configuration")?;
    if !offline_feed && config.allow_provider_enrichment {
        handler = handler.with_range_feed(http_feed(&config)?);
    }

    let summary = handler
        .handle_batch(&raw)
        .await
        .context("Batch could not be handled")?;

    info!(calls = cloud.calls().len(), "Provider calls issued");
    println!("{}", summary.headline());
    println!("{}", summary.to_json_pretty()?);
    Ok(())
}

fn cmd_decode(event: &Path) -> Result<()> {
    let raw: Value = read_json_file(event)?;
    let batch = decode_batch(&raw).context("Failed to decode batch envelope")?;

    if batch.is_control_message() {
        println!("Control message; no flow records");
        return Ok(());
    }

    println!(
        "Log group: {}  stream: {}  records: {}",
        batch.log_group.as_deref().unwrap_or("-"),
        batch.log_stream.as_deref().unwrap_or("-"),
        batch.log_events.len()
    );
    for (index, log_event) in batch.log_events.iter().enumerate() {
        match parse_record(log_event) {
            Ok(record) => println!(
                "{:>4}  {}  {} -> {}",
                index,
                record.interface_id,
                record.source(),
                record.destination()
            ),
            Err(e) => println!("{:>4}  skipped: {}", index, e),
        }
    }
    Ok(())
}

fn cmd_encode(batch: &Path, output: Option<&Path>) -> Result<()> {
    let document: Value = read_json_file(batch)?;
    let envelope = encode_envelope(&document).context("Failed to compress batch")?;
    let text = serde_json::to_string_pretty(&envelope)?;

    match output {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("Failed to write {:?}", path))?;
            println!("✓ Envelope written to {:?}", path);
        }
        None => println!("{}", text),
    }
    Ok(())
}

async fn cmd_check(mut config: Config, addr: &str, port: &str, no_enrichment: bool) -> Result<()> {
    if no_enrichment {
        config.allow_provider_enrichment = false;
    }
    let feed = http_feed(&config)?;
    let policy = build_whitelist(&config, feed.as_ref())
        .await
        .context("Failed to build whitelist")?;

    let address = flowguard_core::domain::parse_address(addr)?;
    println!(
        "Policy: {} rule(s), fingerprint {}",
        policy.whitelist.len(),
        policy.whitelist.fingerprint()
    );
    match policy.whitelist.matching_exception(address, port) {
        Some(rule) => println!("✓ {}:{} allowed by {}", addr, port, rule),
        None => println!("✗ {}:{} is not on the whitelist", addr, port),
    }
    Ok(())
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
}
