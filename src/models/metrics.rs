//! Engine inputs and derived output models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Tag, WarId, WarResult};

/// Default look-back window in days.
pub const DEFAULT_DAYS_BACK: u32 = 90;

/// Default minimum number of wars before a player is scored.
pub const DEFAULT_MIN_WARS: u32 = 3;

/// Discrete band for a composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    Excellent,
    Good,
    Average,
    Poor,
    NeedsCoaching,
}

impl PerformanceTier {
    /// Bands are inclusive on their lower bound.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            PerformanceTier::Excellent
        } else if score >= 65.0 {
            PerformanceTier::Good
        } else if score >= 50.0 {
            PerformanceTier::Average
        } else if score >= 35.0 {
            PerformanceTier::Poor
        } else {
            PerformanceTier::NeedsCoaching
        }
    }
}

impl std::fmt::Display for PerformanceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PerformanceTier::Excellent => write!(f, "excellent"),
            PerformanceTier::Good => write!(f, "good"),
            PerformanceTier::Average => write!(f, "average"),
            PerformanceTier::Poor => write!(f, "poor"),
            PerformanceTier::NeedsCoaching => write!(f, "needs_coaching"),
        }
    }
}

/// Caller-supplied parameters for one engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarIntelligenceOptions {
    /// Raw clan tag; normalized before use
    pub clan_tag: String,

    /// Restrict the run to a single player
    #[serde(default)]
    pub player_tag: Option<String>,

    #[serde(default = "default_days_back")]
    pub days_back: u32,

    #[serde(default = "default_min_wars")]
    pub min_wars: u32,

    /// Fixes the end of the window; defaults to the current time
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}

fn default_days_back() -> u32 {
    DEFAULT_DAYS_BACK
}

fn default_min_wars() -> u32 {
    DEFAULT_MIN_WARS
}

impl WarIntelligenceOptions {
    pub fn new(clan_tag: impl Into<String>) -> Self {
        Self {
            clan_tag: clan_tag.into(),
            player_tag: None,
            days_back: DEFAULT_DAYS_BACK,
            min_wars: DEFAULT_MIN_WARS,
            as_of: None,
        }
    }

    pub fn with_player(mut self, player_tag: impl Into<String>) -> Self {
        self.player_tag = Some(player_tag.into());
        self
    }

    pub fn with_days_back(mut self, days: u32) -> Self {
        self.days_back = days;
        self
    }

    pub fn with_min_wars(mut self, min_wars: u32) -> Self {
        self.min_wars = min_wars;
        self
    }

    pub fn as_of(mut self, at: DateTime<Utc>) -> Self {
        self.as_of = Some(at);
        self
    }
}

/// One week of a player's scored performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyPerformance {
    pub week_start: NaiveDate,
    pub attacks: u32,
    pub stars: u32,
    pub average_stars: f64,
    pub attack_efficiency_index: f64,
    pub consistency_score: f64,
    pub defensive_hold_rate: Option<f64>,
    pub attack_timing_score: f64,
    pub overall_score: f64,
    pub tier: PerformanceTier,
}

/// Scored performance for one player over the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarIntelligenceMetrics {
    pub player_tag: Tag,
    pub player_name: String,
    pub town_hall_level: Option<u8>,

    // Raw totals
    pub total_wars: u32,
    pub total_attacks: u32,
    pub total_stars: u32,
    pub total_destruction: f64,
    pub average_stars: f64,
    pub average_destruction: f64,
    pub total_defenses: u32,
    pub average_defense_destruction: f64,
    pub longest_attack_streak: u32,
    pub failed_attacks: u32,

    // Rates, 0.0 to 1.0
    pub participation_rate: f64,
    pub cleanup_efficiency: f64,
    pub clutch_factor: f64,
    pub defensive_hold_rate: Option<f64>,

    // Scores, 0 to 100
    pub attack_efficiency_index: f64,
    pub consistency_score: f64,
    pub attack_timing_score: f64,
    pub target_selection_quality: f64,
    pub overall_score: f64,

    pub tier: PerformanceTier,

    #[serde(default)]
    pub weekly: Vec<WeeklyPerformance>,
}

/// Clan-wide baselines over eligible players.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanAverages {
    #[serde(rename = "averageAEI")]
    pub average_aei: f64,
    pub average_consistency: f64,
    pub average_hold_rate: f64,
    pub average_overall_score: f64,
}

/// A top performer in the latest war.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopAttacker {
    pub player_tag: Tag,
    pub player_name: String,
    pub attacks: u32,
    pub stars: u32,
    pub destruction: f64,
}

/// Spotlight on the most recent war in the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarSummary {
    pub war_id: WarId,
    pub opponent_name: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub result: Option<WarResult>,
    pub team_size: u32,
    pub clan_stars: u32,
    pub opponent_stars: u32,
    pub attacks_used: u32,
    pub attacks_available: u32,
    pub missed_attacks: u32,
    pub average_stars: f64,
    pub top_attackers: Vec<TopAttacker>,
}

/// Full engine output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarIntelligenceResult {
    pub clan_tag: Tag,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_wars: u32,
    pub metrics: Vec<WarIntelligenceMetrics>,
    pub clan_averages: ClanAverages,
    pub latest_war_summary: Option<WarSummary>,
}

impl WarIntelligenceResult {
    /// True when no player met the eligibility threshold.
    pub fn is_insufficient(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Get a player's metrics by tag.
    pub fn get_player(&self, tag: &Tag) -> Option<&WarIntelligenceMetrics> {
        self.metrics.iter().find(|m| &m.player_tag == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries_are_lower_inclusive() {
        assert_eq!(PerformanceTier::from_score(100.0), PerformanceTier::Excellent);
        assert_eq!(PerformanceTier::from_score(80.0), PerformanceTier::Excellent);
        assert_eq!(PerformanceTier::from_score(79.99), PerformanceTier::Good);
        assert_eq!(PerformanceTier::from_score(65.0), PerformanceTier::Good);
        assert_eq!(PerformanceTier::from_score(50.0), PerformanceTier::Average);
        assert_eq!(PerformanceTier::from_score(35.0), PerformanceTier::Poor);
        assert_eq!(PerformanceTier::from_score(34.0), PerformanceTier::NeedsCoaching);
        assert_eq!(PerformanceTier::from_score(0.0), PerformanceTier::NeedsCoaching);
    }

    #[test]
    fn test_tier_serialization() {
        let json = serde_json::to_string(&PerformanceTier::NeedsCoaching).unwrap();
        assert_eq!(json, "\"needs_coaching\"");
        assert_eq!(format!("{}", PerformanceTier::NeedsCoaching), "needs_coaching");
    }

    #[test]
    fn test_options_defaults() {
        let opts = WarIntelligenceOptions::new("#2PR8R8V8P");
        assert_eq!(opts.days_back, 90);
        assert_eq!(opts.min_wars, 3);
        assert!(opts.player_tag.is_none());
    }

    #[test]
    fn test_options_deserialize_defaults() {
        let opts: WarIntelligenceOptions =
            serde_json::from_str(r##"{"clanTag":"#2PR8R8V8P"}"##).unwrap();
        assert_eq!(opts.days_back, DEFAULT_DAYS_BACK);
        assert_eq!(opts.min_wars, DEFAULT_MIN_WARS);
    }

    #[test]
    fn test_clan_averages_field_names() {
        let json = serde_json::to_value(ClanAverages::default()).unwrap();
        assert!(json.get("averageAEI").is_some());
        assert!(json.get("averageHoldRate").is_some());
    }
}
