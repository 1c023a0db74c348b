//! # War Intel
//!
//! War performance intelligence for a clan dashboard: per-player scores,
//! tiers, weekly trends, clan baselines and a latest-war spotlight, computed
//! in one batch from synced war rows.
//!
//! ## Architecture
//!
//! - **models**: Rows, options and result types
//! - **fetch**: The `WarDataSource` trait and an in-memory source
//! - **storage**: JSONL data directory and the source that reads it
//! - **reconcile**: Merges attack rows, membership counters and activity events
//! - **calculate**: Weekly bucketing, aggregation, scoring and summaries
//! - **engine**: Orchestrates one run
//! - **config**: Configuration loading and validation

pub mod calculate;
pub mod config;
pub mod engine;
pub mod fetch;
pub mod models;
pub mod reconcile;
pub mod storage;

pub use engine::{EngineError, WarIntelligenceEngine};
pub use models::*;
