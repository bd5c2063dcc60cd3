use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct Bootstrap {
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub logger: Logger,
    #[serde(default)]
    pub origin: Origin,
    #[serde(default)]
    pub cache: Cache,
}

impl Bootstrap {
    pub fn validate(&self) -> Result<()> {
        if self.origin.url.trim().is_empty() {
            return Err(anyhow!("origin.url is required"));
        }
        let uri = self
            .origin
            .url
            .parse::<http::Uri>()
            .with_context(|| format!("parse origin.url {}", self.origin.url))?;
        if uri.authority().is_none() {
            return Err(anyhow!("origin.url {} has no host", self.origin.url));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct Logger {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub caller: bool,
    #[serde(default)]
    pub max_size: u64,
    #[serde(default)]
    pub max_age: Option<u64>,
    #[serde(default)]
    pub max_backups: u64,
    #[serde(default)]
    pub compress: bool,
    #[serde(default)]
    pub nopid: bool,
}

/// Zero durations and counts mean "unset"; the engine applies its
/// defaults when building `OriginOptions`.
#[derive(Debug, Deserialize, Default)]
pub struct Origin {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default)]
    pub max_idle_conns_per_host: usize,
    #[serde(default)]
    pub insecure_skip_verify: bool,
    #[serde(default)]
    pub fast_forward_disable: bool,
    #[serde(default, with = "humantime_serde")]
    pub fast_forward_ttl: Duration,
    #[serde(default, with = "humantime_serde")]
    pub backfill_tolerance: Duration,
    #[serde(default)]
    pub timeseries_retention: usize,
}

#[derive(Debug, Deserialize, Default)]
pub struct Cache {
    #[serde(default)]
    pub index: Index,
}

#[derive(Debug, Deserialize, Default)]
pub struct Index {
    #[serde(default, with = "humantime_serde")]
    pub reap_interval: Duration,
    #[serde(default)]
    pub max_size_bytes: u64,
    #[serde(default)]
    pub max_size_backoff_bytes: u64,
    #[serde(default)]
    pub max_size_objects: usize,
    #[serde(default)]
    pub max_size_backoff_objects: usize,
}

pub fn load(path: &Path) -> Result<(Bootstrap, Vec<String>)> {
    let raw = fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let mut ignored = Vec::new();
    let de = serde_yaml::Deserializer::from_str(&raw);
    let cfg: Bootstrap = serde_ignored::deserialize(de, |path| {
        ignored.push(path.to_string());
    })
    .with_context(|| format!("parse config {}", path.display()))?;

    Ok((cfg, ignored))
}
