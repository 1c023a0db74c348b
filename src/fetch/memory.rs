//! In-memory data source.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{FetchError, MemberScope, WarDataSource};
use crate::models::{
    ActivityEvent, AttackFact, DefenderKey, MemberSide, Tag, War, WarId, WarMembership,
};

/// Rows held in memory, filtered on each call the way the store's queries would.
///
/// `attacks` may hold both sides of a war; `fetch_attacks` only returns the
/// ones made by the requested clan.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    pub wars: Vec<War>,
    pub members: Vec<WarMembership>,
    pub attacks: Vec<AttackFact>,
    pub activity: Vec<ActivityEvent>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wars(mut self, wars: Vec<War>) -> Self {
        self.wars = wars;
        self
    }

    pub fn with_members(mut self, members: Vec<WarMembership>) -> Self {
        self.members = members;
        self
    }

    pub fn with_attacks(mut self, attacks: Vec<AttackFact>) -> Self {
        self.attacks = attacks;
        self
    }

    pub fn with_activity(mut self, activity: Vec<ActivityEvent>) -> Self {
        self.activity = activity;
        self
    }
}

#[async_trait]
impl WarDataSource for MemorySource {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch_wars(
        &self,
        clan_tag: &Tag,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Vec<War>, FetchError> {
        let wars: Vec<War> = self
            .wars
            .iter()
            .filter(|w| &w.clan_tag == clan_tag)
            .filter(|w| {
                w.reference_time()
                    .is_some_and(|t| t >= period_start && t <= period_end)
            })
            .cloned()
            .collect();

        debug!("{} wars for {} in window", wars.len(), clan_tag);
        Ok(wars)
    }

    async fn fetch_war_members(
        &self,
        war_ids: &[WarId],
        scope: &MemberScope,
    ) -> Result<Vec<WarMembership>, FetchError> {
        let ids: HashSet<&WarId> = war_ids.iter().collect();
        Ok(self
            .members
            .iter()
            .filter(|m| ids.contains(&m.war_id))
            .filter(|m| match scope {
                MemberScope::Clan(_) => true,
                MemberScope::Player(tag) => &m.player_tag == tag,
            })
            .cloned()
            .collect())
    }

    async fn fetch_attacks(
        &self,
        war_ids: &[WarId],
        clan_tag: &Tag,
        player_tag: Option<&Tag>,
    ) -> Result<Vec<AttackFact>, FetchError> {
        let requested: HashSet<&WarId> = war_ids.iter().collect();
        let ids: HashSet<&WarId> = self
            .wars
            .iter()
            .filter(|w| &w.clan_tag == clan_tag && requested.contains(&w.id))
            .map(|w| &w.id)
            .collect();
        let away: HashSet<DefenderKey> = self
            .members
            .iter()
            .filter(|m| m.side == MemberSide::Away && ids.contains(&m.war_id))
            .map(|m| DefenderKey::new(m.war_id.clone(), m.player_tag.clone()))
            .collect();

        let attacks: Vec<AttackFact> = self
            .attacks
            .iter()
            .filter(|a| player_tag.map_or(true, |tag| &a.attacker_tag == tag))
            .filter(|a| match &a.war_id {
                Some(id) => {
                    ids.contains(id)
                        && !away.contains(&DefenderKey::new(id.clone(), a.attacker_tag.clone()))
                }
                None => false,
            })
            .cloned()
            .collect();

        debug!("{} attacks by {} in {} wars", attacks.len(), clan_tag, ids.len());
        Ok(attacks)
    }

    async fn fetch_activity_events(
        &self,
        clan_tag: &Tag,
        player_tag: &Tag,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, FetchError> {
        Ok(self
            .activity
            .iter()
            .filter(|e| e.is_war_attack())
            .filter(|e| &e.clan_tag == clan_tag && &e.player_tag == player_tag)
            .filter(|e| e.occurred_at >= period_start && e.occurred_at <= period_end)
            .cloned()
            .collect())
    }

    async fn fetch_defender_town_halls(
        &self,
        war_ids: &[WarId],
        defender_tags: &[Tag],
    ) -> Result<HashMap<DefenderKey, u8>, FetchError> {
        let ids: HashSet<&WarId> = war_ids.iter().collect();
        let tags: HashSet<&Tag> = defender_tags.iter().collect();

        Ok(self
            .members
            .iter()
            .filter(|m| m.side == MemberSide::Away)
            .filter(|m| ids.contains(&m.war_id) && tags.contains(&m.player_tag))
            .filter_map(|m| {
                m.town_hall_level
                    .map(|th| (DefenderKey::new(m.war_id.clone(), m.player_tag.clone()), th))
            })
            .collect())
    }
}
