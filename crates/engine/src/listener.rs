use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use common::{Bar, Fill, OrderSide};
use feed::ReplayUpdate;
use strategy::indicators::Sma;

/// Observer of everything the engine processes. Both hooks default to no-ops.
pub trait Listener: Send {
    /// Called once per delivered bar, before strategies see it.
    fn on_bar(&mut self, _update: &ReplayUpdate) {}

    /// Called for every fill, in submission order.
    fn on_fill(&mut self, _fill: &Fill) {}
}

// ─── Trade analyzer ───────────────────────────────────────────────────────────

/// Round-trip statistics. A trade opens when a flat instrument is bought and
/// closes when its position returns to flat. A closed trade with `pnl >= 0`
/// counts as won.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradeStats {
    pub total: u64,
    pub open: u64,
    pub closed: u64,
    pub won: u64,
    pub lost: u64,
    pub pnl_net: f64,
}

#[derive(Debug, Default)]
struct OpenTrade {
    size: f64,
    cost: f64,
    pnl: f64,
}

#[derive(Debug, Default)]
pub struct TradeAnalyzer {
    open: HashMap<String, OpenTrade>,
    stats: TradeStats,
}

impl TradeAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &TradeStats {
        &self.stats
    }
}

impl Listener for TradeAnalyzer {
    fn on_fill(&mut self, fill: &Fill) {
        match fill.side {
            OrderSide::Buy => {
                let trade = self.open.entry(fill.instrument.clone()).or_insert_with(|| {
                    self.stats.total += 1;
                    self.stats.open += 1;
                    OpenTrade::default()
                });
                trade.size += fill.quantity;
                trade.cost += fill.quantity * fill.fill_price;
            }
            OrderSide::Sell => {
                let Some(trade) = self.open.get_mut(&fill.instrument) else {
                    return;
                };
                let avg_entry = trade.cost / trade.size;
                let pnl = (fill.fill_price - avg_entry) * fill.quantity;
                trade.pnl += pnl;
                trade.size -= fill.quantity;
                trade.cost = avg_entry * trade.size;
                self.stats.pnl_net += pnl;

                if trade.size <= f64::EPSILON {
                    let won = trade.pnl >= 0.0;
                    self.open.remove(&fill.instrument);
                    self.stats.open -= 1;
                    self.stats.closed += 1;
                    if won {
                        self.stats.won += 1;
                    } else {
                        self.stats.lost += 1;
                    }
                }
            }
        }
    }
}

// ─── Bar recorder ─────────────────────────────────────────────────────────────

/// A delivered bar together with the moving average of closes at that point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedBar {
    pub index: u64,
    pub bar: Bar,
    pub sma: Option<f64>,
}

/// Keeps the most recent bars per instrument along with a close SMA.
///
/// A replayed bar that is still forming overwrites its previous record.
#[derive(Debug)]
pub struct BarRecorder {
    sma_period: usize,
    lookback: Option<usize>,
    series: HashMap<String, (Sma, VecDeque<RecordedBar>)>,
}

impl BarRecorder {
    pub const DEFAULT_SMA_PERIOD: usize = 3;

    /// `lookback = None` keeps every bar. A zero `sma_period` is treated as 1.
    pub fn new(sma_period: usize, lookback: Option<usize>) -> Self {
        Self {
            sma_period: sma_period.max(1),
            lookback,
            series: HashMap::new(),
        }
    }

    pub fn bars(&self, instrument: &str) -> Vec<RecordedBar> {
        self.series
            .get(instrument)
            .map(|(_, bars)| bars.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn into_recorded(self) -> HashMap<String, Vec<RecordedBar>> {
        self.series
            .into_iter()
            .map(|(instrument, (_, bars))| (instrument, bars.into()))
            .collect()
    }
}

impl Default for BarRecorder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SMA_PERIOD, None)
    }
}

impl Listener for BarRecorder {
    fn on_bar(&mut self, update: &ReplayUpdate) {
        let period = self.sma_period;
        let (sma, bars) = self
            .series
            .entry(update.bar.instrument.clone())
            .or_insert_with(|| (Sma::new(period), VecDeque::new()));

        let replaces_last = !update.is_new && bars.back().is_some_and(|r| r.index == update.index);
        if replaces_last {
            let value = sma.replace_last(update.bar.close);
            if let Some(last) = bars.back_mut() {
                last.bar = update.bar.clone();
                last.sma = value;
            }
            return;
        }

        let value = sma.push(update.bar.close);
        bars.push_back(RecordedBar {
            index: update.index,
            bar: update.bar.clone(),
            sma: value,
        });
        if let Some(limit) = self.lookback {
            while bars.len() > limit {
                bars.pop_front();
            }
        }
    }
}
