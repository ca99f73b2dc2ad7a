use std::sync::Arc;

use tracing::{info, info_span, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, RunFileConfig};
use engine::{BarRecorder, Engine};
use feed::SyntheticFeed;
use paper::PaperBroker;
use strategy::StrategyRegistry;

/// Bars kept per instrument in the final report.
const RECORDED_BARS: usize = 500;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env()?;
    let run_file = RunFileConfig::load(&cfg.run_config_path)?;
    info!(
        path = %cfg.run_config_path,
        feeds = run_file.feeds.len(),
        strategies = run_file.strategies.len(),
        "livedemo starting"
    );

    // ── Broker ────────────────────────────────────────────────────────────────
    let broker = Arc::new(PaperBroker::new(
        cfg.initial_cash,
        cfg.paper_stake,
        cfg.paper_slippage_bps,
    )?);

    // ── Engine ────────────────────────────────────────────────────────────────
    let (engine, handle) = Engine::new(broker.clone());
    let mut engine = engine
        .with_span(info_span!("engine", run = %cfg.run_config_path))
        .with_recorder(BarRecorder::new(
            BarRecorder::DEFAULT_SMA_PERIOD,
            Some(RECORDED_BARS),
        ));
    for feed_cfg in &run_file.feeds {
        let feed = SyntheticFeed::new(feed_cfg.clone())?;
        match &run_file.replay {
            Some(replay) => engine.replay_data(feed, *replay)?,
            None => engine.add_data(feed)?,
        }
    }
    engine.set_strategies(StrategyRegistry::from_config(&run_file.strategies)?);

    // ── Shutdown on Ctrl-C ────────────────────────────────────────────────────
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received. Stopping engine.");
                handle.stop();
            }
            Err(e) => warn!(error = %e, "Could not listen for Ctrl-C"),
        }
    });

    let report = engine.run().await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    info!(
        cash = broker.cash().await,
        value = broker.value().await,
        "Final portfolio"
    );
    Ok(())
}
