//! Statistics calculation engine.
//!
//! Pure transforms from reconciled contributions to scores:
//! - `bucket`: ISO-week keys
//! - `aggregate`: per-player and per-week running totals
//! - `score`: sub-scores, composite and tier
//! - `summary`: clan averages, ranking and the latest-war spotlight

pub mod aggregate;
pub mod bucket;
pub mod score;
pub mod summary;

pub use aggregate::{aggregate, Aggregates, PlayerAggregate};
pub use bucket::week_key;
pub use score::{score, weekly_series};
pub use summary::{clan_averages, latest_war_summary, rank};
