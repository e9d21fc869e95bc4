//! Process configuration, read from the environment (and `.env` if present).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::engine::{normalise_times, validate_capacity};
use crate::limits::MAX_RESERVATIONS;
use crate::model::Schedule;

#[derive(Debug, Clone)]
pub struct Config {
    /// SLOTBOOK_BIND
    pub bind: String,
    /// SLOTBOOK_PORT
    pub port: u16,
    /// SLOTBOOK_DATA_DIR, holds `slotbook.wal`
    pub data_dir: PathBuf,
    /// SLOTBOOK_METRICS_PORT; metrics are off when unset
    pub metrics_port: Option<u16>,
    /// SLOTBOOK_COMPACT_THRESHOLD: WAL appends before the compactor rewrites it
    pub compact_threshold: u64,
    /// SLOTBOOK_COMPACT_INTERVAL_SECS
    pub compact_interval: Duration,
    /// SLOTBOOK_MAX_RESERVATIONS
    pub max_reservations: usize,
    /// SLOTBOOK_DEFAULT_TIMES and SLOTBOOK_DEFAULT_CAPACITY
    pub schedule: Schedule,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5000,
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(30),
            max_reservations: MAX_RESERVATIONS,
            schedule: Schedule::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unset or empty variables keep
    /// their default; set but unparsable ones are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(bind) = get("SLOTBOOK_BIND") {
            config.bind = bind;
        }
        if let Some(port) = get("SLOTBOOK_PORT") {
            config.port = parse_var("SLOTBOOK_PORT", &port)?;
        }
        if let Some(dir) = get("SLOTBOOK_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(port) = get("SLOTBOOK_METRICS_PORT") {
            config.metrics_port = Some(parse_var("SLOTBOOK_METRICS_PORT", &port)?);
        }
        if let Some(threshold) = get("SLOTBOOK_COMPACT_THRESHOLD") {
            config.compact_threshold = parse_var("SLOTBOOK_COMPACT_THRESHOLD", &threshold)?;
        }
        if let Some(secs) = get("SLOTBOOK_COMPACT_INTERVAL_SECS") {
            let secs: u64 = parse_var("SLOTBOOK_COMPACT_INTERVAL_SECS", &secs)?;
            if secs == 0 {
                bail!("SLOTBOOK_COMPACT_INTERVAL_SECS must be positive");
            }
            config.compact_interval = Duration::from_secs(secs);
        }
        if let Some(max) = get("SLOTBOOK_MAX_RESERVATIONS") {
            config.max_reservations = parse_var("SLOTBOOK_MAX_RESERVATIONS", &max)?;
        }
        if let Some(capacity) = get("SLOTBOOK_DEFAULT_CAPACITY") {
            let capacity = parse_var("SLOTBOOK_DEFAULT_CAPACITY", &capacity)?;
            config.schedule.capacity =
                validate_capacity(capacity).context("SLOTBOOK_DEFAULT_CAPACITY")?;
        }
        if let Some(times) = get("SLOTBOOK_DEFAULT_TIMES") {
            let raw: Vec<String> = times
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
            config.schedule.times = normalise_times(&raw).context("SLOTBOOK_DEFAULT_TIMES")?;
        }

        Ok(config)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("slotbook.wal")
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse_var<T>(name: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{name}={raw:?} is not valid"))
}
