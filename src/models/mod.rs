//! Core data models for the war intelligence engine.

mod ids;
mod metrics;
mod war;

pub use ids::*;
pub use metrics::*;
pub use war::*;
