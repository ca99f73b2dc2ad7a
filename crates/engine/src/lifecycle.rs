use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use common::{Bar, Broker, EngineState, Error, ReplayConfig, Result};
use feed::{ReplayUpdate, Replayer, SyntheticFeed};
use strategy::{BarContext, Strategy, StrategyRegistry};

use crate::executor::OrderExecutor;
use crate::listener::{BarRecorder, Listener, TradeAnalyzer};
use crate::report::RunReport;

/// Capacity of the channel all feeds publish into.
const BAR_CHANNEL_CAPACITY: usize = 1024;

/// Cloneable handle for stopping a run from elsewhere (signal handler, tests).
#[derive(Clone)]
pub struct EngineHandle {
    shutdown: Arc<watch::Sender<bool>>,
    state: Arc<RwLock<EngineState>>,
}

impl EngineHandle {
    /// Request the run to stop. Pending feed waits are abandoned.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }
}

/// Per-feed bookkeeping inside a run.
struct Stream {
    replayer: Option<Replayer>,
    bars: u64,
}

impl Stream {
    fn advance(&mut self, bar: Bar) -> ReplayUpdate {
        match &mut self.replayer {
            Some(replayer) => replayer.push(&bar),
            None => {
                self.bars += 1;
                ReplayUpdate {
                    bar,
                    index: self.bars,
                    is_new: true,
                }
            }
        }
    }
}

/// Drives feeds, strategies, broker and listeners for one run.
///
/// Register everything, then call `run`. Bars from all feeds are merged in
/// arrival order and processed strictly one at a time.
pub struct Engine {
    broker: Arc<dyn Broker>,
    executor: OrderExecutor,
    registry: StrategyRegistry,
    feeds: Vec<SyntheticFeed>,
    streams: HashMap<String, Stream>,
    analyzer: TradeAnalyzer,
    recorder: BarRecorder,
    listeners: Vec<Box<dyn Listener>>,
    state: Arc<RwLock<EngineState>>,
    shutdown: Arc<watch::Sender<bool>>,
    span: Span,
}

impl Engine {
    pub fn new(broker: Arc<dyn Broker>) -> (Self, EngineHandle) {
        let (shutdown, _) = watch::channel(false);
        let shutdown = Arc::new(shutdown);
        let state = Arc::new(RwLock::new(EngineState::Stopped));

        let handle = EngineHandle {
            shutdown: shutdown.clone(),
            state: state.clone(),
        };

        let engine = Engine {
            executor: OrderExecutor::new(broker.clone()),
            broker,
            registry: StrategyRegistry::new(),
            feeds: Vec::new(),
            streams: HashMap::new(),
            analyzer: TradeAnalyzer::new(),
            recorder: BarRecorder::default(),
            listeners: Vec::new(),
            state,
            shutdown,
            span: info_span!("engine"),
        };

        (engine, handle)
    }

    /// Replace the engine's logging span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_recorder(mut self, recorder: BarRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn add_strategy(&mut self, strategy: Box<dyn Strategy>) {
        self.registry.add(strategy);
    }

    pub fn set_strategies(&mut self, registry: StrategyRegistry) {
        self.registry = registry;
    }

    pub fn add_listener(&mut self, listener: Box<dyn Listener>) {
        self.listeners.push(listener);
    }

    /// Deliver the feed's bars unchanged.
    pub fn add_data(&mut self, feed: SyntheticFeed) -> Result<()> {
        self.register(feed, None)
    }

    /// Deliver the feed folded into `replay`-sized bars, the forming bar on
    /// every tick.
    pub fn replay_data(&mut self, feed: SyntheticFeed, replay: ReplayConfig) -> Result<()> {
        let replayer = Replayer::new(replay)?;
        self.register(feed, Some(replayer))
    }

    fn register(&mut self, feed: SyntheticFeed, replayer: Option<Replayer>) -> Result<()> {
        let name = feed.name().to_string();
        if self.streams.contains_key(&name) {
            return Err(Error::config(format!("feed '{name}' registered twice")));
        }
        let span = info_span!(
            parent: &self.span,
            "feed",
            name = %name,
            domain = feed.config().trading_domain.as_deref().unwrap_or("-")
        );
        let feed = feed.with_span(span);
        self.streams.insert(name, Stream { replayer, bars: 0 });
        self.feeds.push(feed);
        Ok(())
    }

    /// Run until every feed is exhausted or `EngineHandle::stop` is called.
    ///
    /// A broker error ends the run and is returned unchanged.
    pub async fn run(mut self) -> Result<RunReport> {
        let span = self.span.clone();
        async move {
            for strategy in self.registry.iter() {
                if !self.streams.contains_key(strategy.instrument()) {
                    warn!(
                        strategy = %strategy.name(),
                        instrument = %strategy.instrument(),
                        "Strategy trades an instrument no feed provides"
                    );
                }
            }

            *self.state.write().await = EngineState::Running;
            info!(feeds = self.feeds.len(), strategies = self.registry.len(), "Engine running");

            let (bar_tx, mut bar_rx) = mpsc::channel(BAR_CHANNEL_CAPACITY);
            let tasks: Vec<JoinHandle<()>> = self
                .feeds
                .drain(..)
                .map(|feed| tokio::spawn(feed.run(bar_tx.clone(), self.shutdown.subscribe())))
                .collect();
            drop(bar_tx);

            let mut report = RunReport::default();
            let outcome = self.drive(&mut bar_rx, &mut report).await;

            // stop feeds still producing and wait for them to wind down
            drop(bar_rx);
            self.shutdown.send_replace(true);
            for task in tasks {
                if let Err(e) = task.await {
                    warn!(error = %e, "Feed task ended abnormally");
                }
            }
            *self.state.write().await = EngineState::Stopped;

            outcome?;
            report.trades = self.analyzer.stats().clone();
            report.recorded = self.recorder.into_recorded();
            info!(
                bars = report.bars_processed,
                fills = report.fills.len(),
                trades = report.trades.total,
                stopped = report.stopped,
                "Engine stopped"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self, bar_rx: &mut mpsc::Receiver<Bar>, report: &mut RunReport) -> Result<()> {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            if *shutdown.borrow_and_update() {
                report.stopped = true;
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => continue,
                bar = bar_rx.recv() => match bar {
                    Some(bar) => self.process(bar, report).await?,
                    None => return Ok(()),
                },
            }
        }
    }

    async fn process(&mut self, bar: Bar, report: &mut RunReport) -> Result<()> {
        self.broker.update_price(&bar.instrument, bar.close).await;

        let Some(stream) = self.streams.get_mut(&bar.instrument) else {
            warn!(instrument = %bar.instrument, "Bar from unregistered feed dropped");
            return Ok(());
        };
        let update = stream.advance(bar);
        report.bars_processed += 1;
        debug!(
            instrument = %update.bar.instrument,
            index = update.index,
            new = update.is_new,
            close = update.bar.close,
            "Bar"
        );

        self.analyzer.on_bar(&update);
        self.recorder.on_bar(&update);
        for listener in self.listeners.iter_mut() {
            listener.on_bar(&update);
        }

        for strategy in self.registry.for_instrument(&update.bar.instrument) {
            let position = self.broker.position(strategy.instrument()).await?;
            let ctx = BarContext {
                bar_index: update.index,
                position_size: position.size,
            };
            let intents = strategy.on_bar(&update.bar, &ctx);
            report.intents += intents.len() as u64;

            for intent in &intents {
                let fill = self.executor.execute(intent).await?;
                self.analyzer.on_fill(&fill);
                self.recorder.on_fill(&fill);
                for listener in self.listeners.iter_mut() {
                    listener.on_fill(&fill);
                }
                report.fills.push(fill);
            }
        }

        Ok(())
    }
}
