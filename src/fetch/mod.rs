//! Row fetchers.
//!
//! The engine reads its inputs through the `WarDataSource` trait. Implementations
//! are pure I/O: they filter rows by clan, player and window and apply no
//! business rules. Retries belong here, not in the engine.

mod memory;

pub use memory::MemorySource;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{ActivityEvent, AttackFact, DefenderKey, Tag, War, WarId, WarMembership};

/// Errors raised by a data source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

impl From<crate::storage::StorageError> for FetchError {
    fn from(e: crate::storage::StorageError) -> Self {
        FetchError::Storage(e.to_string())
    }
}

/// The fetch that failed, reported alongside the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    Wars,
    Members,
    Attacks,
    Activity,
    Defenders,
}

impl std::fmt::Display for FetchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStage::Wars => write!(f, "wars"),
            FetchStage::Members => write!(f, "members"),
            FetchStage::Attacks => write!(f, "attacks"),
            FetchStage::Activity => write!(f, "activity"),
            FetchStage::Defenders => write!(f, "defenders"),
        }
    }
}

/// Whose membership rows to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberScope {
    /// Every row (both sides) of the given wars
    Clan(Tag),
    /// Only the given player's rows
    Player(Tag),
}

/// Read access to the store.
#[async_trait]
pub trait WarDataSource: Send + Sync {
    /// Source identifier for logging.
    fn name(&self) -> &'static str;

    /// Wars of `clan_tag` whose start (or end, if start is unknown) lies in the window.
    async fn fetch_wars(
        &self,
        clan_tag: &Tag,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Vec<War>, FetchError>;

    /// Membership rows for the given wars.
    async fn fetch_war_members(
        &self,
        war_ids: &[WarId],
        scope: &MemberScope,
    ) -> Result<Vec<WarMembership>, FetchError>;

    /// Structured attacks made by the clan in the given wars.
    async fn fetch_attacks(
        &self,
        war_ids: &[WarId],
        clan_tag: &Tag,
        player_tag: Option<&Tag>,
    ) -> Result<Vec<AttackFact>, FetchError>;

    /// `war_attack` activity events for one player in the window.
    async fn fetch_activity_events(
        &self,
        clan_tag: &Tag,
        player_tag: &Tag,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, FetchError>;

    /// Town-Hall levels of opponent bases, keyed by war and tag.
    async fn fetch_defender_town_halls(
        &self,
        war_ids: &[WarId],
        defender_tags: &[Tag],
    ) -> Result<HashMap<DefenderKey, u8>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_stage_display() {
        assert_eq!(FetchStage::Wars.to_string(), "wars");
        assert_eq!(FetchStage::Defenders.to_string(), "defenders");
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::Unavailable("connection refused".to_string());
        assert_eq!(err.to_string(), "Source unavailable: connection refused");
    }
}
