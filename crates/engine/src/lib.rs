pub mod executor;
pub mod lifecycle;
pub mod listener;
pub mod report;

pub use executor::OrderExecutor;
pub use lifecycle::{Engine, EngineHandle};
pub use listener::{BarRecorder, Listener, RecordedBar, TradeAnalyzer, TradeStats};
pub use report::RunReport;
