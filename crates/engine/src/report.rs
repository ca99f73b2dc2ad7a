use std::collections::HashMap;

use serde::Serialize;

use common::Fill;

use crate::listener::{RecordedBar, TradeStats};

/// Everything a finished run hands back to its caller.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Bars delivered to listeners and strategies, replay updates included.
    pub bars_processed: u64,
    pub intents: u64,
    pub fills: Vec<Fill>,
    pub trades: TradeStats,
    /// Recorded bars per instrument.
    pub recorded: HashMap<String, Vec<RecordedBar>>,
    /// True when the run ended because of a stop request.
    pub stopped: bool,
}
