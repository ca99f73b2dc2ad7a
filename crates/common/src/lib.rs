pub mod broker;
pub mod config;
pub mod error;
pub mod types;

pub use broker::Broker;
pub use config::{Config, FeedConfig, ReplayConfig, RunFileConfig, StrategyConfig, StrategyParams};
pub use error::{Error, Result};
pub use types::*;
