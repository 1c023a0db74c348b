//! Source rows read from the store.
//!
//! These are immutable once fetched; the engine never writes back.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{Tag, WarId};

/// Event type recorded for individual war attacks in the activity log.
pub const WAR_ATTACK_EVENT: &str = "war_attack";

/// Outcome of a war from the home clan's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarResult {
    Win,
    Lose,
    Tie,
}

impl std::fmt::Display for WarResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarResult::Win => write!(f, "win"),
            WarResult::Lose => write!(f, "lose"),
            WarResult::Tie => write!(f, "tie"),
        }
    }
}

/// Kind of war. League wars can overlap in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WarType {
    #[default]
    Regular,
    Cwl,
    Friendly,
}

/// One clan war.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct War {
    pub id: WarId,

    /// Home clan
    pub clan_tag: Tag,

    #[serde(default)]
    pub opponent_tag: Option<Tag>,

    #[serde(default)]
    pub opponent_name: Option<String>,

    #[serde(default)]
    pub war_type: WarType,

    pub start_time: Option<DateTime<Utc>>,

    pub end_time: Option<DateTime<Utc>>,

    /// Bases per side
    pub team_size: u32,

    #[serde(default)]
    pub result: Option<WarResult>,

    #[serde(default)]
    pub clan_stars: u32,

    #[serde(default)]
    pub opponent_stars: u32,
}

impl War {
    /// Attacks available to the home clan (two per base).
    pub fn attacks_available(&self) -> u32 {
        self.team_size * 2
    }

    /// Most recent timestamp known for this war.
    pub fn reference_time(&self) -> Option<DateTime<Utc>> {
        self.start_time.or(self.end_time)
    }

    /// Whether `at` falls inside the war's battle interval.
    ///
    /// A missing end time is treated as `start + default_duration`. Wars with
    /// no start time never contain anything.
    pub fn contains(&self, at: DateTime<Utc>, default_duration: Duration) -> bool {
        let Some(start) = self.start_time else {
            return false;
        };
        let end = self.end_time.unwrap_or(start + default_duration);
        at >= start && at <= end
    }
}

/// Which side of the war a membership row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemberSide {
    #[default]
    Home,
    Away,
}

/// Attack entry embedded in a membership row by the ingestion job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAttack {
    pub defender_tag: Option<Tag>,
    pub stars: u8,
    pub destruction: f64,
    #[serde(default)]
    pub order: Option<u32>,
}

/// A player's participation record for one war.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarMembership {
    pub war_id: WarId,
    pub player_tag: Tag,
    pub player_name: String,

    #[serde(default)]
    pub side: MemberSide,

    #[serde(default)]
    pub town_hall_level: Option<u8>,

    /// Attack counter; absent or zero on some ingested rows
    #[serde(default)]
    pub attacks: Option<u32>,

    #[serde(default)]
    pub stars: Option<u32>,

    /// Sum of destruction percent over this war's attacks
    #[serde(default)]
    pub destruction: Option<f64>,

    #[serde(default)]
    pub defense_count: Option<u32>,

    /// Sum of destruction percent suffered over this war's defenses
    #[serde(default)]
    pub defense_destruction: Option<f64>,

    #[serde(default)]
    pub raw_attacks: Vec<RawAttack>,
}

/// One individual attack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackFact {
    /// Null only for attacks reconstructed from the activity log
    pub war_id: Option<WarId>,
    pub attacker_tag: Tag,
    pub attacker_name: String,
    pub defender_tag: Option<Tag>,
    pub stars: u8,
    pub destruction: f64,

    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub order_index: Option<u32>,

    #[serde(default)]
    pub attacker_town_hall: Option<u8>,

    #[serde(default)]
    pub defender_town_hall: Option<u8>,

    /// Position within the war, 0-100; filled in during reconciliation
    #[serde(default)]
    pub position_percentile: Option<f64>,
}

impl AttackFact {
    /// Attacker base is stronger than the defender's.
    pub fn is_cleanup(&self) -> bool {
        matches!(
            (self.attacker_town_hall, self.defender_town_hall),
            (Some(a), Some(d)) if a > d
        )
    }

    /// Attacker base is no stronger than the defender's.
    pub fn is_even_or_up(&self) -> bool {
        matches!(
            (self.attacker_town_hall, self.defender_town_hall),
            (Some(a), Some(d)) if a <= d
        )
    }
}

/// Extra fields carried by `war_attack` activity events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActivityMetadata {
    #[serde(default)]
    pub destruction: Option<f64>,

    #[serde(default)]
    pub order_index: Option<u32>,

    #[serde(default)]
    pub defender_tag: Option<Tag>,
}

/// Generic activity log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub clan_tag: Tag,
    pub player_tag: Tag,

    #[serde(default)]
    pub player_name: Option<String>,

    pub event_type: String,

    /// Stars, for `war_attack` events
    pub value: f64,

    pub occurred_at: DateTime<Utc>,

    #[serde(default)]
    pub metadata: ActivityMetadata,
}

impl ActivityEvent {
    pub fn is_war_attack(&self) -> bool {
        self.event_type == WAR_ATTACK_EVENT
    }
}
