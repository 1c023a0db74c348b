//! Data source backed by the JSONL data directory.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use super::{EntityType, FileReport, JsonlReader, StorageConfig, StorageError};
use crate::fetch::{FetchError, MemberScope, MemorySource, WarDataSource};
use crate::models::{ActivityEvent, AttackFact, DefenderKey, Tag, War, WarId, WarMembership};

/// Row counts loaded from the data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceCounts {
    pub wars: usize,
    pub members: usize,
    pub attacks: usize,
    pub activity: usize,
}

/// Loads every file once and answers queries from memory.
pub struct JsonlSource {
    config: StorageConfig,
    rows: MemorySource,
}

impl JsonlSource {
    /// Read all entity files under the data directory.
    ///
    /// Missing files read as empty; a missing directory is an error.
    pub fn open(config: StorageConfig) -> Result<Self, StorageError> {
        if !config.data_dir.is_dir() {
            return Err(StorageError::PathNotFound(config.data_dir.clone()));
        }

        let rows = MemorySource::new()
            .with_wars(JsonlReader::for_entity(&config, EntityType::War).read_all()?)
            .with_members(JsonlReader::for_entity(&config, EntityType::Membership).read_all()?)
            .with_attacks(JsonlReader::for_entity(&config, EntityType::Attack).read_all()?)
            .with_activity(JsonlReader::for_entity(&config, EntityType::Activity).read_all()?);

        let source = Self { config, rows };
        let counts = source.counts();
        info!(
            "Loaded {} wars, {} members, {} attacks, {} activity events from {:?}",
            counts.wars, counts.members, counts.attacks, counts.activity, source.config.data_dir
        );
        Ok(source)
    }

    pub fn counts(&self) -> SourceCounts {
        SourceCounts {
            wars: self.rows.wars.len(),
            members: self.rows.members.len(),
            attacks: self.rows.attacks.len(),
            activity: self.rows.activity.len(),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }
}

/// Check every entity file for unparseable lines.
pub fn validate(config: &StorageConfig) -> Result<Vec<(EntityType, FileReport)>, StorageError> {
    EntityType::ALL
        .iter()
        .map(|&entity| -> Result<(EntityType, FileReport), StorageError> {
            let report = match entity {
                EntityType::War => JsonlReader::<War>::for_entity(config, entity).scan()?,
                EntityType::Membership => {
                    JsonlReader::<WarMembership>::for_entity(config, entity).scan()?
                }
                EntityType::Attack => JsonlReader::<AttackFact>::for_entity(config, entity).scan()?,
                EntityType::Activity => {
                    JsonlReader::<ActivityEvent>::for_entity(config, entity).scan()?
                }
            };
            Ok((entity, report))
        })
        .collect()
}

#[async_trait]
impl WarDataSource for JsonlSource {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    async fn fetch_wars(
        &self,
        clan_tag: &Tag,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Vec<War>, FetchError> {
        self.rows.fetch_wars(clan_tag, period_start, period_end).await
    }

    async fn fetch_war_members(
        &self,
        war_ids: &[WarId],
        scope: &MemberScope,
    ) -> Result<Vec<WarMembership>, FetchError> {
        self.rows.fetch_war_members(war_ids, scope).await
    }

    async fn fetch_attacks(
        &self,
        war_ids: &[WarId],
        clan_tag: &Tag,
        player_tag: Option<&Tag>,
    ) -> Result<Vec<AttackFact>, FetchError> {
        self.rows.fetch_attacks(war_ids, clan_tag, player_tag).await
    }

    async fn fetch_activity_events(
        &self,
        clan_tag: &Tag,
        player_tag: &Tag,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, FetchError> {
        self.rows
            .fetch_activity_events(clan_tag, player_tag, period_start, period_end)
            .await
    }

    async fn fetch_defender_town_halls(
        &self,
        war_ids: &[WarId],
        defender_tags: &[Tag],
    ) -> Result<HashMap<DefenderKey, u8>, FetchError> {
        self.rows
            .fetch_defender_town_halls(war_ids, defender_tags)
            .await
    }
}
