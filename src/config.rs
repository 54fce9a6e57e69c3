//! CLI surface and `--config` file parsing (§6).

use std::path::Path;

use clap::ValueEnum;

use crate::error::{PubFabricError, Result};

/// `Dissemination.Strategy` key read from the `--config` INI file. Decides
/// both how a publisher disseminates and how Discovery answers
/// `LookupPubByTopic` (§9 open question 1: broker mode returns brokers,
/// direct mode filters publishers by topic intersection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DisseminationStrategy {
  Direct,
  Broker,
}

impl DisseminationStrategy {
  pub fn load(path: &Path) -> Result<Self> {
    let ini = ini::Ini::load_from_file(path)
      .map_err(|e| PubFabricError::Config(format!("reading {}: {e}", path.display())))?;
    let section = ini.section(Some("Dissemination")).ok_or_else(|| {
      PubFabricError::Config(format!(
        "{}: missing [Dissemination] section",
        path.display()
      ))
    })?;
    let strategy = section.get("Strategy").ok_or_else(|| {
      PubFabricError::Config(format!(
        "{}: [Dissemination] missing Strategy key",
        path.display()
      ))
    })?;
    match strategy {
      "Direct" => Ok(Self::Direct),
      "Broker" => Ok(Self::Broker),
      other => Err(PubFabricError::Config(format!(
        "{}: unrecognized Dissemination.Strategy {other:?}, expected Direct or Broker",
        path.display()
      ))),
    }
  }
}

/// Coordination-service connect string. Fixed per §6, but overridable for
/// local testing rather than hardcoded.
pub fn default_coordination_hosts() -> &'static str {
  "10.0.0.1:2181"
}

#[derive(Debug, Clone, clap::Parser)]
#[command(about = "Discovery node for the pub/sub fabric")]
pub struct DiscoveryArgs {
  #[arg(short, long, default_value = "127.0.0.1")]
  pub addr: String,
  #[arg(short, long, default_value_t = 5555)]
  pub port: u16,
  #[arg(short, long, default_value = "disc")]
  pub name: String,
  #[arg(short, long, default_value = "config.ini")]
  pub config: std::path::PathBuf,
  #[arg(short = 'o', long, default_value = "10.0.0.1:2181")]
  pub coordination: String,
  #[arg(short = 'l', long, default_value = "info")]
  pub loglevel: String,
}

#[derive(Debug, Clone, clap::Parser)]
#[command(about = "Broker node for the pub/sub fabric")]
pub struct BrokerArgs {
  #[arg(short, long, default_value = "broker")]
  pub name: String,
  #[arg(short, long, default_value = "127.0.0.1")]
  pub addr: String,
  #[arg(short, long, default_value_t = 5588)]
  pub port: u16,
  #[arg(short, long, default_value = "config.ini")]
  pub config: std::path::PathBuf,
  #[arg(short = 'o', long, default_value = "10.0.0.1:2181")]
  pub coordination: String,
  #[arg(short = 'l', long, default_value = "info")]
  pub loglevel: String,
}

#[derive(Debug, Clone, clap::Parser)]
#[command(about = "Publisher node for the pub/sub fabric")]
pub struct PublisherArgs {
  #[arg(short, long)]
  pub name: String,
  #[arg(short, long, default_value = "127.0.0.1")]
  pub addr: String,
  #[arg(short, long)]
  pub port: u16,
  #[arg(short, long, value_delimiter = ',')]
  pub topics: Vec<String>,
  #[arg(short, long, default_value = "config.ini")]
  pub config: std::path::PathBuf,
  #[arg(short = 'i', long, default_value_t = 1000)]
  pub iters: u32,
  #[arg(long = "hs", default_value_t = 10)]
  pub history: usize,
  #[arg(short, long, default_value = "10.0.0.1:2181")]
  pub discovery: String,
  /// How long to wait for peers to register when `/discovery/pubs` is
  /// empty at startup, before evaluating ownership strength (§4.5 step 2,
  /// §9 open question 3 — a tuneable grace window, 0 disables the wait).
  #[arg(long = "grace-window-ms", default_value_t = 10_000)]
  pub grace_window_ms: u64,
  #[arg(short = 'l', long, default_value = "info")]
  pub loglevel: String,
}

#[derive(Debug, Clone, clap::Parser)]
#[command(about = "Subscriber node for the pub/sub fabric")]
pub struct SubscriberArgs {
  #[arg(short, long)]
  pub name: String,
  #[arg(short, long, default_value = "127.0.0.1")]
  pub addr: String,
  #[arg(short, long)]
  pub port: u16,
  #[arg(short, long, value_delimiter = ',')]
  pub topics: Vec<String>,
  #[arg(short, long, default_value = "config.ini")]
  pub config: std::path::PathBuf,
  #[arg(long = "hs", default_value_t = 0)]
  pub history: usize,
  #[arg(short, long, default_value = "10.0.0.1:2181")]
  pub discovery: String,
  #[arg(short = 'l', long, default_value = "info")]
  pub loglevel: String,
}

#[derive(Debug, Clone, clap::Parser)]
#[command(about = "Reset coordination state between test runs")]
pub struct ClearCoordArgs {
  #[arg(short, long, default_value = "10.0.0.1:2181")]
  pub coordination: String,
  #[arg(short = 'l', long, default_value = "info")]
  pub loglevel: String,
}

pub fn init_logging(level: &str) {
  let filter = match level.to_ascii_lowercase().as_str() {
    "trace" => log::LevelFilter::Trace,
    "debug" => log::LevelFilter::Debug,
    "warn" | "warning" => log::LevelFilter::Warn,
    "error" => log::LevelFilter::Error,
    _ => log::LevelFilter::Info,
  };
  let _ = env_logger::Builder::new().filter_level(filter).try_init();
}
