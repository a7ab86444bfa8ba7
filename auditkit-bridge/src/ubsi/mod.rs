//! UBSI (User-Beacon System-call Instrumentation) unit-analysis engine.

mod engine;
mod iteration;
mod types;

pub use engine::UbsiEngine;
pub use iteration::IterationCounter;
pub use types::{ThreadKey, ThreadTime, Timestamp, UnitKey};
