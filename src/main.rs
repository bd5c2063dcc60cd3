use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use timegate::cache::CacheStore;
use timegate::config;
use timegate::extent::Extent;
use timegate::index::{CacheIndex, IndexOptions};
use timegate::logging;
use timegate::origin::HttpOriginClient;
use timegate::proxy::{DeltaProxy, OriginOptions};
use timegate::runtime;
use timegate::timeseries::TimeRangeQuery;

#[derive(Parser, Debug)]
#[command(name = "timegate", about = "Delta-caching accelerator for time-series backends", version)]
struct Cli {
    /// Config file path
    #[arg(short = 'c', default_value = "config.yaml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Query statement to run against the origin
    #[arg(long)]
    query: String,

    /// Range start, unix seconds
    #[arg(long)]
    start: i64,

    /// Range end, unix seconds
    #[arg(long)]
    end: i64,

    /// Sampling step, e.g. 30s
    #[arg(long, default_value = "60s", value_parser = humantime::parse_duration)]
    step: Duration,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (cfg, ignored) = config::load(&cli.config)?;

    logging::init(&cfg.logger, cli.verbose)?;

    if cfg.strict && !ignored.is_empty() {
        return Err(anyhow!("unknown config fields: {}", ignored.join(", ")));
    }

    if !ignored.is_empty() {
        log::warn!("ignoring unknown config fields: {}", ignored.join(", "));
    }

    cfg.validate()?;

    let info = runtime::build_info();
    log::info!("{} {} starting", info.name, info.version);

    let template: http::Uri = cfg.origin.url.parse().context("parse origin url")?;
    let origin = Arc::new(HttpOriginClient::new(&cfg.origin));
    let store = Arc::new(CacheStore::new());
    let index = Arc::new(CacheIndex::new(IndexOptions::from_config(&cfg.cache.index)));
    let engine = DeltaProxy::new(origin, store, index, OriginOptions::from_config(&cfg.origin));
    let _reaper = engine.spawn_reaper();

    let trq = TimeRangeQuery::new(
        cli.query,
        Extent::new(cli.start, cli.end),
        cli.step,
        template,
    );
    log::info!("executing {trq}");

    let resp = engine.fetch(trq).await?;
    log::info!(
        "{} samples, cache {}, complete={}",
        resp.samples.len(),
        resp.status.as_str(),
        resp.complete
    );
    println!("{}", serde_json::to_string_pretty(&resp.samples)?);
    Ok(())
}
