//! EPG Grabber
//! Reconciles an IPTV playlist with XMLTV guide feeds and writes one
//! merged guide holding only the playlist's channels and the next few days.

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Context;
use chrono::NaiveDateTime;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

mod config;
mod epg;
mod error;
mod fetch;
mod m3u_parser;
mod normalize;

#[cfg(test)]
mod m3u_parser_tests;

use config::GrabberConfig;
use error::InputStage;
use m3u_parser::LineupIndex;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Playlist URL or file path
    playlist: String,

    /// One or more EPG URLs or file paths (plain or gzip)
    #[arg(required = true)]
    epg: Vec<String>,

    /// Keep programmes starting at most this many days ahead
    #[arg(long)]
    horizon_days: Option<u32>,

    /// Treat this UTC instant (YYYYMMDDHHMMSS) as "now"
    #[arg(long, value_parser = parse_reference_time)]
    reference_time: Option<NaiveDateTime>,

    /// Output file
    #[arg(short, long)]
    output: Option<String>,

    /// Write plain XML instead of gzip
    #[arg(long)]
    no_compress: bool,

    /// Path to configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Persist the effective settings to the configuration file
    #[arg(long)]
    save_config: bool,
}

fn parse_reference_time(value: &str) -> Result<NaiveDateTime, String> {
    epg::parse_start_time(value).map_err(|e| e.to_string())
}

impl Args {
    /// File settings with command-line overrides applied
    fn effective_config(&self, mut config: GrabberConfig) -> GrabberConfig {
        if let Some(days) = self.horizon_days {
            config.horizon_days = days;
        }
        if let Some(output) = &self.output {
            config.output_path = output.clone();
        }
        if self.no_compress {
            config.compress_output = false;
        }
        config
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(GrabberConfig::default_path);
    let config = args.effective_config(GrabberConfig::load_from(&config_path)?);
    info!("Configuration: {:?}", config);

    if args.save_config {
        config.save_to(&config_path)?;
        info!("Configuration saved to {}", config_path.display());
    }

    run(&args, &config)
}

fn run(args: &Args, config: &GrabberConfig) -> anyhow::Result<()> {
    let download = config.download_config();

    info!("Loading playlist: {}", args.playlist);
    let playlist = fetch::fetch(&args.playlist, InputStage::Playlist, &download)
        .context("Playlist stage failed")?;
    let lineup = LineupIndex::from_bytes(&playlist);
    lineup.log_summary();
    if lineup.is_empty() {
        warn!("Playlist {} has no tvg-ids or channel names", args.playlist);
    }

    info!("Loading {} EPG feed(s)", args.epg.len());
    let feeds = fetch::load_epg_feeds(&args.epg, &download).context("EPG stage failed")?;

    let mut options = config.filter_options();
    options.reference_time = args.reference_time;
    match options.cutoff() {
        Some(cutoff) => info!(
            "Keeping programmes starting before {}",
            epg::format_xmltv_time(cutoff)
        ),
        None => warn!("Horizon of {} days overflows, keeping every programme", options.horizon_days),
    }

    let outcome = epg::reconcile(&lineup, feeds, &options).context("EPG schema check failed")?;
    info!("Reconciliation summary: {:?}", outcome.stats);

    let output = Path::new(&config.output_path);
    let size = fetch::write_output(&outcome.document, output, config.compress_output)
        .context("Writing the filtered EPG failed")?;
    info!(
        "Filtered EPG saved as {} ({} KB, {} channels, {} programmes)",
        output.display(),
        size / 1024,
        outcome.document.channel_count(),
        outcome.document.programme_count()
    );

    Ok(())
}
