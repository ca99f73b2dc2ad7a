use serde::{Deserialize, Serialize};

use crate::{Error, Result, TimeFrame};

/// Process-level configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the TOML run file describing feeds and strategies.
    pub run_config_path: String,

    // Paper broker
    pub initial_cash: f64,
    pub paper_stake: f64,
    pub paper_slippage_bps: f64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Loads `.env` if present. Every variable is optional; malformed numbers
    /// are a configuration error.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        Ok(Config {
            run_config_path: optional_env("RUN_CONFIG_PATH")
                .unwrap_or_else(|| "config/livedemo.toml".to_string()),
            initial_cash: parsed_env("INITIAL_CASH", 10_000.0)?,
            paper_stake: parsed_env("PAPER_STAKE", 1.0)?,
            paper_slippage_bps: parsed_env("PAPER_SLIPPAGE_BPS", 0.0)?,
        })
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parsed_env(key: &str, default: f64) -> Result<f64> {
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::config(format!("{key} must be a number, got '{raw}'"))),
        None => Ok(default),
    }
}

/// Parameters of one synthetic feed. Validated when the feed is built.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    /// Instrument name the feed publishes under, e.g. `"data0"`.
    pub name: String,
    #[serde(default)]
    pub timeframe: TimeFrame,
    #[serde(default = "default_compression")]
    pub compression: u32,
    /// Seconds after activation at which the feed stops. `None` runs forever.
    #[serde(default)]
    pub run_duration_secs: Option<f64>,
    #[serde(default = "default_starting_value")]
    pub starting_value: f64,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: f64,
    /// Pace bars on the clock. When false bars are produced back-to-back.
    #[serde(default = "default_live")]
    pub live: bool,
    /// Bars emitted as an immediate burst before paced emission.
    #[serde(default)]
    pub num_gen_bars: u32,
    #[serde(default)]
    pub start_delay_secs: f64,
    /// Free-form label grouping feeds that trade in the same session.
    #[serde(default)]
    pub trading_domain: Option<String>,
    /// Standard deviation of a close-to-close step, in percent of `starting_value`.
    #[serde(default = "default_volatility")]
    pub volatility: f64,
    /// Fixed seed for a reproducible price walk.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl FeedConfig {
    /// A feed with the same defaults a `[[feed]]` table gets when it only
    /// names the feed.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeframe: TimeFrame::default(),
            compression: default_compression(),
            run_duration_secs: None,
            starting_value: default_starting_value(),
            tick_interval_secs: default_tick_interval_secs(),
            live: default_live(),
            num_gen_bars: 0,
            start_delay_secs: 0.0,
            trading_domain: None,
            volatility: default_volatility(),
            seed: None,
        }
    }
}

fn default_compression() -> u32 {
    1
}

fn default_starting_value() -> f64 {
    200.0
}

fn default_tick_interval_secs() -> f64 {
    1.0
}

fn default_live() -> bool {
    true
}

fn default_volatility() -> f64 {
    0.5
}

/// Target granularity when folding a feed's bars into larger ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReplayConfig {
    pub timeframe: TimeFrame,
    pub compression: u32,
}

/// Buy/sell cadence of the periodic strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct StrategyParams {
    pub modbuy: u64,
    pub modsell: u64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self { modbuy: 2, modsell: 3 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Strategy type identifier. Only `"periodic"` is known.
    #[serde(rename = "type")]
    pub strategy_type: String,
    /// Human-readable name shown in logs.
    pub name: String,
    /// Feed name the strategy trades.
    pub instrument: String,
    #[serde(default)]
    pub params: StrategyParams,
}

/// Run file (TOML).
///
/// Example `config/livedemo.toml`:
/// ```toml
/// [replay]
/// timeframe = "seconds"
/// compression = 60
///
/// [[feed]]
/// name = "data0"
/// tick_interval_secs = 1.0
///
/// [[strategy]]
/// type = "periodic"
/// name = "live demo"
/// instrument = "data0"
///
/// [strategy.params]
/// modbuy = 2
/// modsell = 3
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunFileConfig {
    #[serde(rename = "feed")]
    pub feeds: Vec<FeedConfig>,
    /// Applied to every feed when present.
    #[serde(default)]
    pub replay: Option<ReplayConfig>,
    #[serde(rename = "strategy", default)]
    pub strategies: Vec<StrategyConfig>,
}

impl RunFileConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read run config at '{path}': {e}")))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let cfg: RunFileConfig = toml::from_str(content)?;
        if cfg.feeds.is_empty() {
            return Err(Error::config("run config declares no [[feed]]"));
        }
        Ok(cfg)
    }
}
