//! safezoned - SafeZone safety event daemon
//!
//! This daemon:
//! 1. Loads configuration (file named by SAFEZONE_CONFIG, then env overrides)
//! 2. Opens the detection source (stub:// synthetic scene or .jsonl replay)
//! 3. Classifies every processed frame for overcrowding, falls, fights and loitering
//! 4. Delivers deduplicated alerts to the configured endpoint (or the log)
//! 5. Stops cleanly on Ctrl-C, letting an in-flight alert finish its retries

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use safezone_core::{build_sink, open_source, Pipeline, SafezoneConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Detect safety events in a detection stream")]
struct Args {
    /// Config file (TOML when the name ends in .toml, JSON otherwise).
    #[arg(long, env = "SAFEZONE_CONFIG")]
    config: Option<PathBuf>,

    /// Detection source: stub://<name>, file://<path> or a .jsonl path.
    #[arg(long, env = "VIDEO_SOURCE")]
    source: Option<String>,

    /// Alert endpoint (http:// or https://). Alerts are logged when unset.
    #[arg(long, env = "ALERT_ENDPOINT")]
    endpoint: Option<String>,

    /// Location label stamped onto alerts.
    #[arg(long, env = "SAFEZONE_LOCATION")]
    location: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => SafezoneConfig::load_from(path)?,
        None => SafezoneConfig::load()?,
    };
    if let Some(source) = args.source {
        config.source.url = source;
    }
    if let Some(endpoint) = args.endpoint.filter(|e| !e.trim().is_empty()) {
        config.alerts.endpoint = Some(endpoint);
    }
    if let Some(location) = args.location {
        config.alerts.location = location;
    }
    config.validate()?;

    log::info!(
        "safezoned {} starting: source={} location={}",
        env!("CARGO_PKG_VERSION"),
        config.source.url,
        config.alerts.location
    );
    log::info!(
        "thresholds: confidence={} crowd={} fall={} cooldown={}s",
        config.detection.confidence_threshold,
        config.classifiers.crowd_threshold,
        config.classifiers.fall_threshold,
        config.alerts.cooldown.as_secs()
    );

    let mut source = open_source(&config.source.url)?;
    let sink = build_sink(&config.alerts)?;
    let mut pipeline = Pipeline::new(config, sink)?;

    let stop = pipeline.stop_handle();
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received, stopping...");
        stop.request();
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let summary = pipeline.run(source.as_mut())?;
    log::info!(
        "final stats: {}",
        serde_json::to_string(&summary).map_err(|e| anyhow!("encode summary: {}", e))?
    );
    Ok(())
}
