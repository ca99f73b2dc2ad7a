pub mod replay;
pub mod synthetic;
mod walk;

pub use replay::{ReplayUpdate, Replayer};
pub use synthetic::SyntheticFeed;
