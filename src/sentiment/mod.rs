pub mod economic;
pub mod engine;
pub mod order_flow;

pub use engine::{size_multiplier, SentimentEngine};
pub use order_flow::OrderFlowAnalyzer;
