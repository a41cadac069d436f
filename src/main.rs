//! c2-hunt: command-line front end for C2 weak-signal hunting.
//!
//! Reads flow and DNS logs exported as CSV, runs the detectors from the
//! `c2_hunt` library, and prints ranked results for an analyst.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use c2_hunt::config::Config;
use c2_hunt::export::{export_domains, export_hunt, export_risk, OutputFormat};
use c2_hunt::flow::FlowTable;
use c2_hunt::ingest::{load_dns, load_flows};
use c2_hunt::ioc::IocList;
use c2_hunt::pipeline::{hunt_beacons, hunt_domains};
use c2_hunt::scoring::{fuse, SignalSet};

/// c2-hunt: surface weak behavioural indicators of C2 in flow and DNS logs.
#[derive(Parser, Debug)]
#[command(name = "c2-hunt")]
#[command(version)]
#[command(about = "Hunt for C2 beaconing and high-entropy DNS in exported logs")]
#[command(long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (writes to stderr).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rank flows by periodicity and flag adaptive beacon candidates.
    Beacons {
        /// Flow CSV with src_ip, dst_ip, dst_port and timestamp (or ts).
        #[arg(long)]
        csv: PathBuf,

        /// Minimum events per flow series.
        #[arg(short, long)]
        min_events: Option<usize>,

        /// Minimum pooled intervals per host baseline.
        #[arg(long)]
        min_host_samples: Option<usize>,

        /// How many flows to show (0 = all).
        #[arg(short, long)]
        top: Option<usize>,

        /// Show only adaptive beacon candidates.
        #[arg(long)]
        candidates_only: bool,

        /// Indicator list (one address or domain per line).
        #[arg(long)]
        ioc: Option<PathBuf>,

        /// Output format: text, json, jsonl.
        #[arg(short, long)]
        output: Option<OutputFormat>,
    },

    /// Score queried domains for entropy and IOC matches.
    Dns {
        /// DNS CSV with query (or domain) and optional timestamp.
        #[arg(long)]
        csv: PathBuf,

        /// List every domain, not only flagged ones.
        #[arg(long)]
        all: bool,

        /// Indicator list (one address or domain per line).
        #[arg(long)]
        ioc: Option<PathBuf>,

        /// Output format: text, json, jsonl.
        #[arg(short, long)]
        output: Option<OutputFormat>,
    },

    /// Fuse a set of weak signals into a risk score.
    Score {
        #[arg(long)]
        beacon: bool,

        #[arg(long)]
        dns_entropy: bool,

        #[arg(long)]
        rare_tls: bool,

        #[arg(long)]
        ioc_match: bool,

        /// Output format: text, json, jsonl.
        #[arg(short, long)]
        output: Option<OutputFormat>,
    },

    /// Print the default configuration as TOML.
    InitConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Beacons {
            csv,
            min_events,
            min_host_samples,
            top,
            candidates_only,
            ioc,
            output,
        } => {
            if let Some(n) = min_events {
                config.flow.min_samples_flow = n;
            }
            if let Some(n) = min_host_samples {
                config.baseline.min_samples_host = n;
            }
            if let Some(n) = top {
                config.output.top = n;
            }
            if let Some(format) = output {
                config.output.format = format;
            }
            config.validate()?;

            run_beacons(&csv, ioc.as_deref(), candidates_only, &config)
        }

        Commands::Dns {
            csv,
            all,
            ioc,
            output,
        } => {
            if let Some(format) = output {
                config.output.format = format;
            }
            config.validate()?;

            let iocs = ioc.as_deref().map(IocList::load).transpose()?;
            let records = load_dns(&csv)?;
            let report = hunt_domains(&records, &config, iocs.as_ref())?;
            println!("{}", export_domains(&report, config.output.format, all));
            Ok(())
        }

        Commands::Score {
            beacon,
            dns_entropy,
            rare_tls,
            ioc_match,
            output,
        } => {
            config.validate()?;

            let signals = SignalSet {
                beacon,
                dns_entropy,
                rare_tls,
                ioc_match,
            };
            let risk = fuse(&signals, &config.scoring);
            println!("{}", export_risk(&risk, output.unwrap_or(config.output.format)));
            Ok(())
        }

        Commands::InitConfig => {
            println!("{}", Config::generate_default());
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => {
            info!("Loading configuration from {}", p.display());
            Config::load(p)
        }
        None => Ok(Config::default()),
    }
}

fn run_beacons(
    csv: &Path,
    ioc: Option<&Path>,
    candidates_only: bool,
    config: &Config,
) -> Result<()> {
    info!("Analyzing flow log: {}", csv.display());

    let iocs = ioc.map(IocList::load).transpose()?;
    let records = load_flows(csv)?;
    let table = FlowTable::from_records(records)
        .with_context(|| format!("Invalid flow records in {}", csv.display()))?;

    let mut report = hunt_beacons(&table, config, iocs.as_ref());
    if candidates_only {
        report.flows.retain(|f| f.adaptive_beacon);
    }

    println!(
        "{}",
        export_hunt(&report, config.output.format, config.output.top)
    );
    Ok(())
}
