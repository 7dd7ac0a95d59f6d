//! Matching core: price levels, order books, ingress queue, and the
//! single-writer engine with its recovery path.

pub mod book;
#[allow(clippy::module_inception)]
pub mod engine;
pub mod price_level;
pub mod queue;
mod recovery;
pub mod types;

pub use book::{BookSnapshot, LevelView, OrderBook, SnapshotRegistry};
pub use engine::{EngineConfig, EngineHandle, MatchingEngine};
pub use price_level::{BookEntry, PriceLevel};
pub use queue::{CommandQueue, QueueError, QueueReceiver, QueueSender};
pub use types::EngineCommand;
