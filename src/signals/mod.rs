pub mod engine;
pub mod indicators;

pub use engine::SignalEngine;
pub use indicators::Indicator;
