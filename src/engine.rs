//! War intelligence engine.
//!
//! Runs one batch: validate options, fetch the rows, then reconcile,
//! bucket, aggregate, score, summarize and rank in memory.
//! Nothing is cached between runs.

use std::collections::{BTreeSet, HashMap};

use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::calculate::{self, summary::DEFAULT_TOP_ATTACKERS};
use crate::fetch::{FetchError, FetchStage, MemberScope, WarDataSource};
use crate::models::{
    ClanAverages, Tag, War, WarId, WarIntelligenceMetrics, WarIntelligenceOptions,
    WarIntelligenceResult, WarSummary,
};
use crate::reconcile::{self, ReconcileInput};

/// Errors that abort an engine run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid {kind} tag: {value:?}")]
    InvalidTag { kind: &'static str, value: String },

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Failed to fetch {stage}: {source}")]
    Fetch {
        stage: FetchStage,
        #[source]
        source: FetchError,
    },
}

impl EngineError {
    fn fetch(stage: FetchStage) -> impl FnOnce(FetchError) -> Self {
        move |source| EngineError::Fetch { stage, source }
    }

    /// The failing fetch stage, if this is a fetch error.
    pub fn stage(&self) -> Option<FetchStage> {
        match self {
            EngineError::Fetch { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Tunables that are not part of a single request.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Assumed length of a war whose end time is unknown
    pub default_war_duration: Duration,
    /// Attackers listed in the latest-war spotlight
    pub top_attackers: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_war_duration: Duration::hours(48),
            top_attackers: DEFAULT_TOP_ATTACKERS,
        }
    }
}

/// Computes war performance metrics for one clan from a data source.
pub struct WarIntelligenceEngine<S> {
    source: S,
    settings: EngineSettings,
}

impl<S: WarDataSource> WarIntelligenceEngine<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            settings: EngineSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Run the full pipeline.
    ///
    /// Fewer than `min_wars` wars in the window is not an error: the result
    /// has no metrics and zeroed averages but still carries the spotlight.
    pub async fn compute(
        &self,
        options: &WarIntelligenceOptions,
    ) -> Result<WarIntelligenceResult, EngineError> {
        let clan_tag = Tag::parse(&options.clan_tag).ok_or_else(|| EngineError::InvalidTag {
            kind: "clan",
            value: options.clan_tag.clone(),
        })?;
        let player_tag = match &options.player_tag {
            Some(raw) => Some(Tag::parse(raw).ok_or_else(|| EngineError::InvalidTag {
                kind: "player",
                value: raw.clone(),
            })?),
            None => None,
        };
        if options.days_back == 0 {
            return Err(EngineError::InvalidOptions(
                "days_back must be greater than 0".to_string(),
            ));
        }

        let period_end = options.as_of.unwrap_or_else(Utc::now);
        let period_start = period_end
            .checked_sub_signed(Duration::days(options.days_back as i64))
            .ok_or_else(|| {
                EngineError::InvalidOptions(format!(
                    "days_back {} reaches past the earliest representable date",
                    options.days_back
                ))
            })?;

        info!(
            "Computing war intelligence for {} ({} to {}) via {}",
            clan_tag,
            period_start.date_naive(),
            period_end.date_naive(),
            self.source.name()
        );

        let wars = self
            .source
            .fetch_wars(&clan_tag, period_start, period_end)
            .await
            .map_err(EngineError::fetch(FetchStage::Wars))?;
        let war_ids: Vec<WarId> = wars.iter().map(|w| w.id.clone()).collect();
        debug!("Fetched {} wars", wars.len());

        let scope = match &player_tag {
            Some(tag) => MemberScope::Player(tag.clone()),
            None => MemberScope::Clan(clan_tag.clone()),
        };

        let (members, attacks) = tokio::try_join!(
            async {
                self.source
                    .fetch_war_members(&war_ids, &scope)
                    .await
                    .map_err(EngineError::fetch(FetchStage::Members))
            },
            async {
                self.source
                    .fetch_attacks(&war_ids, &clan_tag, player_tag.as_ref())
                    .await
                    .map_err(EngineError::fetch(FetchStage::Attacks))
            },
        )?;
        debug!(
            "Fetched {} membership rows and {} attacks",
            members.len(),
            attacks.len()
        );

        // Activity is only read when the player has no attack rows. It must
        // arrive before the defender lookup so rebuilt attacks get Town Halls.
        let activity = match &player_tag {
            Some(player) if attacks.is_empty() => self
                .source
                .fetch_activity_events(&clan_tag, player, period_start, period_end)
                .await
                .map_err(EngineError::fetch(FetchStage::Activity))?,
            _ => Vec::new(),
        };

        let defender_tags: Vec<Tag> = attacks
            .iter()
            .filter_map(|a| a.defender_tag.clone())
            .chain(
                members
                    .iter()
                    .flat_map(|m| m.raw_attacks.iter().filter_map(|r| r.defender_tag.clone())),
            )
            .chain(
                activity
                    .iter()
                    .filter(|e| e.is_war_attack())
                    .filter_map(|e| e.metadata.defender_tag.clone()),
            )
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let defender_town_halls = if defender_tags.is_empty() {
            HashMap::new()
        } else {
            self.source
                .fetch_defender_town_halls(&war_ids, &defender_tags)
                .await
                .map_err(EngineError::fetch(FetchStage::Defenders))?
        };
        debug!(
            "Resolved {} defender Town Halls, {} activity events",
            defender_town_halls.len(),
            activity.len()
        );

        let contributions = reconcile::reconcile(
            &ReconcileInput {
                wars: &wars,
                members: &members,
                attacks: &attacks,
                activity: &activity,
                defender_town_halls: &defender_town_halls,
                player: player_tag.as_ref(),
            },
            self.settings.default_war_duration,
        );
        let aggregates = calculate::aggregate(&contributions);

        let mut metrics: Vec<WarIntelligenceMetrics> = Vec::new();
        if wars.len() as u32 >= options.min_wars {
            for (tag, agg) in &aggregates.all_time {
                if agg.total_wars() < options.min_wars {
                    continue;
                }
                if let Some(mut m) = calculate::score(agg) {
                    m.weekly = calculate::weekly_series(aggregates.weeks_for(tag));
                    metrics.push(m);
                }
            }
        }
        calculate::rank(&mut metrics);

        let clan_averages = if metrics.is_empty() {
            ClanAverages::default()
        } else {
            calculate::clan_averages(&metrics)
        };
        let latest_war_summary = match &player_tag {
            Some(_) => self.clan_spotlight(&wars, &clan_tag).await?,
            None => {
                calculate::latest_war_summary(&wars, &contributions, self.settings.top_attackers)
            }
        };

        info!(
            "Scored {} of {} players over {} wars",
            metrics.len(),
            aggregates.all_time.len(),
            wars.len()
        );

        Ok(WarIntelligenceResult {
            clan_tag,
            period_start,
            period_end,
            total_wars: wars.len() as u32,
            metrics,
            clan_averages,
            latest_war_summary,
        })
    }

    /// Spotlight for a player-scoped run.
    ///
    /// The run's own rows cover one player only, so the latest war is read
    /// again at clan scope.
    async fn clan_spotlight(
        &self,
        wars: &[War],
        clan_tag: &Tag,
    ) -> Result<Option<WarSummary>, EngineError> {
        let Some(latest) = calculate::summary::latest_war(wars) else {
            return Ok(None);
        };
        let war_ids = [latest.id.clone()];
        let scope = MemberScope::Clan(clan_tag.clone());

        let (members, attacks) = tokio::try_join!(
            async {
                self.source
                    .fetch_war_members(&war_ids, &scope)
                    .await
                    .map_err(EngineError::fetch(FetchStage::Members))
            },
            async {
                self.source
                    .fetch_attacks(&war_ids, clan_tag, None)
                    .await
                    .map_err(EngineError::fetch(FetchStage::Attacks))
            },
        )?;

        let contributions = reconcile::reconcile(
            &ReconcileInput {
                wars,
                members: &members,
                attacks: &attacks,
                activity: &[],
                defender_town_halls: &HashMap::new(),
                player: None,
            },
            self.settings.default_war_duration,
        );
        Ok(calculate::latest_war_summary(
            wars,
            &contributions,
            self.settings.top_attackers,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};
    use pretty_assertions::assert_eq;

    use crate::calculate::score::{WEIGHT_AEI, WEIGHT_CONSISTENCY, WEIGHT_TIMING};
    use crate::fetch::MemorySource;
    use crate::models::{
        ActivityEvent, ActivityMetadata, AttackFact, DefenderKey, MemberSide, PerformanceTier,
        WarMembership, WarType, WAR_ATTACK_EVENT,
    };

    const CLAN: &str = "#2PR8R8V8P";
    const ALICE: &str = "#PQ2";
    const BOB: &str = "#PQ8";
    const CAROL: &str = "#PQ9";
    const DAVE: &str = "#PY0";

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap()
    }

    fn start(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, 12, 0, 0).unwrap()
    }

    fn war(id: &str, day: u32) -> War {
        War {
            id: WarId::from(id),
            clan_tag: Tag::from(CLAN),
            opponent_tag: Some(Tag::from("#QLG2YV")),
            opponent_name: Some("Rivals".to_string()),
            war_type: WarType::Regular,
            start_time: Some(start(day)),
            end_time: Some(start(day) + Duration::hours(24)),
            team_size: 5,
            result: None,
            clan_stars: 0,
            opponent_stars: 0,
        }
    }

    fn member(war_id: &str, tag: &str, side: MemberSide, th: u8) -> WarMembership {
        WarMembership {
            war_id: WarId::from(war_id),
            player_tag: Tag::from(tag),
            player_name: tag.to_string(),
            side,
            town_hall_level: Some(th),
            attacks: None,
            stars: None,
            destruction: None,
            defense_count: None,
            defense_destruction: None,
            raw_attacks: Vec::new(),
        }
    }

    fn attack(war_id: &str, tag: &str, defender: &str, stars: u8, pct: f64, order: u32) -> AttackFact {
        AttackFact {
            war_id: Some(WarId::from(war_id)),
            attacker_tag: Tag::from(tag),
            attacker_name: tag.to_string(),
            defender_tag: Some(Tag::from(defender)),
            stars,
            destruction: pct,
            timestamp: None,
            order_index: Some(order),
            attacker_town_hall: None,
            defender_town_hall: None,
            position_percentile: None,
        }
    }

    /// Four wars. Alice attacks twice per war and defends, Bob attacks once
    /// per war uphill, Carol only joins the last two wars and Dave never
    /// attacks.
    fn fixture() -> MemorySource {
        let wars = vec![war("w1", 2), war("w2", 5), war("w3", 9), war("w4", 16)];
        let mut members = Vec::new();
        let mut attacks = Vec::new();

        for w in &wars {
            let id = w.id.as_str();
            let mut alice = member(id, ALICE, MemberSide::Home, 14);
            alice.defense_count = Some(1);
            alice.defense_destruction = Some(60.0);
            members.push(alice);
            members.push(member(id, BOB, MemberSide::Home, 13));
            members.push(member(id, "#E1", MemberSide::Away, 14));
            members.push(member(id, "#E2", MemberSide::Away, 13));
            members.push(member(id, "#E3", MemberSide::Away, 12));

            attacks.push(attack(id, ALICE, "#E1", 3, 100.0, 3));
            attacks.push(attack(id, ALICE, "#E2", 2, 85.0, 6));
            attacks.push(attack(id, BOB, "#E1", 1, 45.0, 9));
        }
        for id in ["w1", "w2", "w3"] {
            let mut dave = member(id, DAVE, MemberSide::Home, 12);
            dave.attacks = Some(0);
            dave.stars = Some(0);
            members.push(dave);
        }
        for id in ["w3", "w4"] {
            members.push(member(id, CAROL, MemberSide::Home, 15));
            attacks.push(attack(id, CAROL, "#E3", 3, 100.0, 1));
            attacks.push(attack(id, CAROL, "#E3", 3, 100.0, 10));
        }

        MemorySource::new()
            .with_wars(wars)
            .with_members(members)
            .with_attacks(attacks)
    }

    fn options() -> WarIntelligenceOptions {
        WarIntelligenceOptions::new(CLAN).as_of(as_of())
    }

    #[tokio::test]
    async fn test_compute_scores_and_ranks() {
        let engine = WarIntelligenceEngine::new(fixture());
        let result = engine.compute(&options()).await.unwrap();

        assert_eq!(result.total_wars, 4);
        assert_eq!(result.period_end, as_of());
        assert_eq!(result.period_start, as_of() - Duration::days(90));

        let tags: Vec<&str> = result.metrics.iter().map(|m| m.player_tag.as_str()).collect();
        assert_eq!(tags, vec![ALICE, BOB]);

        let alice = &result.metrics[0];
        assert_eq!(alice.total_wars, 4);
        assert_eq!(alice.total_attacks, 8);
        assert_eq!(alice.total_stars, 20);
        assert_eq!(alice.cleanup_efficiency, 0.5);
        assert!((alice.attack_efficiency_index - 82.75).abs() < 1e-9);
        assert!((alice.consistency_score - 100.0).abs() < 1e-9);
        assert_eq!(alice.defensive_hold_rate, Some(0.4));
        assert_eq!(alice.attack_timing_score, 100.0);
        assert!((alice.overall_score - 81.1).abs() < 1e-9);
        assert_eq!(alice.tier, PerformanceTier::Excellent);

        let bob = &result.metrics[1];
        assert_eq!(bob.total_attacks, 4);
        assert_eq!(bob.defensive_hold_rate, None);
        assert_eq!(bob.attack_timing_score, 75.0);
        assert_eq!(bob.target_selection_quality, 0.0);
        assert_eq!(bob.failed_attacks, 4);
        assert!((bob.overall_score - 50.5).abs() < 1e-9);
        assert_eq!(bob.tier, PerformanceTier::Average);
    }

    #[tokio::test]
    async fn test_composite_renormalized_without_defense() {
        let engine = WarIntelligenceEngine::new(fixture());
        let result = engine.compute(&options()).await.unwrap();
        let bob = result.get_player(&Tag::from(BOB)).unwrap();

        let denominator = WEIGHT_AEI + WEIGHT_CONSISTENCY + WEIGHT_TIMING;
        let expected = bob.attack_efficiency_index * (WEIGHT_AEI / denominator)
            + bob.consistency_score * (WEIGHT_CONSISTENCY / denominator)
            + bob.attack_timing_score * (WEIGHT_TIMING / denominator);
        assert!((bob.overall_score - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_eligibility_and_clan_averages() {
        let engine = WarIntelligenceEngine::new(fixture());
        let result = engine.compute(&options()).await.unwrap();

        // Carol has two wars, Dave never attacked
        assert!(result.get_player(&Tag::from(CAROL)).is_none());
        assert!(result.get_player(&Tag::from(DAVE)).is_none());
        assert!(result.metrics.iter().all(|m| m.total_wars >= 3));

        let avg = &result.clan_averages;
        assert!((avg.average_aei - (82.75 + 33.5) / 2.0).abs() < 1e-9);
        assert!((avg.average_hold_rate - 0.4).abs() < 1e-9);
        assert!((avg.average_overall_score - (81.1 + 50.5) / 2.0).abs() < 1e-9);

        let lowered = engine.compute(&options().with_min_wars(2)).await.unwrap();
        assert!(lowered.get_player(&Tag::from(CAROL)).is_some());
    }

    #[tokio::test]
    async fn test_latest_war_spotlight() {
        let engine = WarIntelligenceEngine::new(fixture());
        let result = engine.compute(&options()).await.unwrap();
        let summary = result.latest_war_summary.unwrap();

        assert_eq!(summary.war_id, WarId::from("w4"));
        assert_eq!(summary.attacks_available, 10);
        assert_eq!(summary.attacks_used, 5);
        assert_eq!(summary.missed_attacks, 5);
        assert_eq!(summary.top_attackers[0].player_tag, Tag::from(CAROL));
        assert_eq!(summary.top_attackers[1].player_tag, Tag::from(ALICE));
    }

    #[tokio::test]
    async fn test_weekly_series_matches_totals() {
        let engine = WarIntelligenceEngine::new(fixture());
        let result = engine.compute(&options()).await.unwrap();
        let alice = result.get_player(&Tag::from(ALICE)).unwrap();

        let weeks: Vec<String> = alice.weekly.iter().map(|w| w.week_start.to_string()).collect();
        assert_eq!(weeks, vec!["2025-06-02", "2025-06-09", "2025-06-16"]);
        assert_eq!(
            alice.weekly.iter().map(|w| w.attacks).sum::<u32>(),
            alice.total_attacks
        );
        assert_eq!(
            alice.weekly.iter().map(|w| w.stars).sum::<u32>(),
            alice.total_stars
        );
    }

    #[tokio::test]
    async fn test_compute_is_idempotent() {
        let engine = WarIntelligenceEngine::new(fixture());
        let first = engine.compute(&options()).await.unwrap();
        let second = engine.compute(&options()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_too_few_wars_yields_empty_result() {
        let engine = WarIntelligenceEngine::new(fixture());
        let result = engine
            .compute(&options().with_min_wars(5))
            .await
            .unwrap();

        assert!(result.is_insufficient());
        assert_eq!(result.total_wars, 4);
        assert_eq!(result.clan_averages, ClanAverages::default());
        assert!(result.latest_war_summary.is_some());
    }

    #[tokio::test]
    async fn test_empty_window() {
        let engine = WarIntelligenceEngine::new(fixture());
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let result = engine.compute(&options().as_of(early)).await.unwrap();

        assert_eq!(result.total_wars, 0);
        assert!(result.metrics.is_empty());
        assert!(result.latest_war_summary.is_none());
    }

    #[tokio::test]
    async fn test_membership_stars_imply_one_attack() {
        let wars = vec![war("w1", 2), war("w2", 5), war("w3", 9)];
        let members = wars
            .iter()
            .map(|w| {
                let mut row = member(w.id.as_str(), ALICE, MemberSide::Home, 14);
                row.attacks = Some(0);
                row.stars = Some(2);
                row.destruction = Some(70.0);
                row
            })
            .collect();
        let engine = WarIntelligenceEngine::new(
            MemorySource::new().with_wars(wars).with_members(members),
        );

        let result = engine.compute(&options()).await.unwrap();
        let alice = result.get_player(&Tag::from(ALICE)).unwrap();

        assert_eq!(alice.total_attacks, 3);
        assert_eq!(alice.total_stars, 6);
    }

    #[tokio::test]
    async fn test_single_player_activity_fallback() {
        let wars = vec![war("w1", 2), war("w2", 5), war("w3", 9)];
        let members: Vec<WarMembership> = wars
            .iter()
            .map(|w| member(w.id.as_str(), ALICE, MemberSide::Home, 14))
            .collect();
        let mut activity: Vec<ActivityEvent> = [2, 5, 9]
            .iter()
            .map(|&day| ActivityEvent {
                clan_tag: Tag::from(CLAN),
                player_tag: Tag::from(ALICE),
                player_name: Some("alice".to_string()),
                event_type: WAR_ATTACK_EVENT.to_string(),
                value: 2.0,
                occurred_at: start(day) + Duration::hours(6),
                metadata: ActivityMetadata {
                    destruction: Some(80.0),
                    order_index: Some(5),
                    defender_tag: None,
                },
            })
            .collect();
        // Between wars: counted, but tied to no war
        activity.push(ActivityEvent {
            occurred_at: start(20),
            ..activity[0].clone()
        });

        let source = MemorySource::new()
            .with_wars(wars)
            .with_members(members)
            .with_activity(activity);
        let engine = WarIntelligenceEngine::new(source);

        let result = engine
            .compute(&options().with_player("pq2"))
            .await
            .unwrap();
        let alice = &result.metrics[0];

        assert_eq!(alice.total_wars, 3);
        assert_eq!(alice.total_attacks, 4);
        assert_eq!(alice.total_stars, 8);
        assert_eq!(alice.attack_timing_score, 87.5);

        // Clan-wide runs never consult the activity log
        let clan_wide = engine.compute(&options()).await.unwrap();
        assert!(clan_wide.metrics.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_tags_rejected() {
        let engine = WarIntelligenceEngine::new(fixture());

        let err = engine
            .compute(&WarIntelligenceOptions::new("not a tag"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTag { kind: "clan", .. }));

        let err = engine
            .compute(&options().with_player("#ABC"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTag { kind: "player", .. }));

        let err = engine
            .compute(&options().with_days_back(0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidOptions(_)));

        let err = engine
            .compute(&options().with_days_back(200_000_000))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidOptions(_)));
    }

    #[tokio::test]
    async fn test_opponent_attacks_are_ignored() {
        let mut source = fixture();
        for id in ["w1", "w2", "w3", "w4"] {
            source.attacks.push(attack(id, "#E1", ALICE, 3, 100.0, 2));
            source.attacks.push(attack(id, "#E1", BOB, 3, 100.0, 4));
        }
        let engine = WarIntelligenceEngine::new(source);

        let result = engine.compute(&options()).await.unwrap();

        let tags: Vec<&str> = result.metrics.iter().map(|m| m.player_tag.as_str()).collect();
        assert_eq!(tags, vec![ALICE, BOB]);
        assert!((result.metrics[0].overall_score - 81.1).abs() < 1e-9);

        let summary = result.latest_war_summary.unwrap();
        assert_eq!(summary.attacks_used, 5);
        assert_eq!(summary.missed_attacks, 5);
        assert!(summary
            .top_attackers
            .iter()
            .all(|a| a.player_tag != Tag::from("#E1")));
    }

    #[tokio::test]
    async fn test_player_run_spotlight_matches_clan() {
        let engine = WarIntelligenceEngine::new(fixture());

        let clan = engine.compute(&options()).await.unwrap();
        let player = engine
            .compute(&options().with_player(ALICE))
            .await
            .unwrap();

        assert_eq!(player.metrics.len(), 1);
        let summary = player.latest_war_summary.unwrap();
        assert_eq!(summary.attacks_used, 5);
        assert_eq!(summary.missed_attacks, 5);
        assert_eq!(Some(summary), clan.latest_war_summary);
    }

    #[tokio::test]
    async fn test_fallback_attacks_get_defender_town_hall() {
        let wars = vec![war("w1", 2), war("w2", 5), war("w3", 9)];
        let members: Vec<WarMembership> = wars
            .iter()
            .flat_map(|w| {
                [
                    member(w.id.as_str(), ALICE, MemberSide::Home, 14),
                    member(w.id.as_str(), "#E1", MemberSide::Away, 12),
                ]
            })
            .collect();
        let activity: Vec<ActivityEvent> = [2, 5, 9]
            .iter()
            .map(|&day| ActivityEvent {
                clan_tag: Tag::from(CLAN),
                player_tag: Tag::from(ALICE),
                player_name: Some("alice".to_string()),
                event_type: WAR_ATTACK_EVENT.to_string(),
                value: 3.0,
                occurred_at: start(day) + Duration::hours(6),
                metadata: ActivityMetadata {
                    destruction: Some(100.0),
                    order_index: Some(5),
                    defender_tag: Some(Tag::from("#E1")),
                },
            })
            .collect();
        let engine = WarIntelligenceEngine::new(
            MemorySource::new()
                .with_wars(wars)
                .with_members(members)
                .with_activity(activity),
        );

        let result = engine
            .compute(&options().with_player(ALICE))
            .await
            .unwrap();
        let alice = &result.metrics[0];

        assert_eq!(alice.total_attacks, 3);
        assert_eq!(alice.cleanup_efficiency, 1.0);
    }

    /// Delegates to a `MemorySource` but fails one stage.
    struct FailingSource {
        inner: MemorySource,
        fail: FetchStage,
    }

    impl FailingSource {
        fn check(&self, stage: FetchStage) -> Result<(), FetchError> {
            if self.fail == stage {
                Err(FetchError::Unavailable("store offline".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl WarDataSource for FailingSource {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn fetch_wars(
            &self,
            clan_tag: &Tag,
            period_start: DateTime<Utc>,
            period_end: DateTime<Utc>,
        ) -> Result<Vec<War>, FetchError> {
            self.check(FetchStage::Wars)?;
            self.inner.fetch_wars(clan_tag, period_start, period_end).await
        }

        async fn fetch_war_members(
            &self,
            war_ids: &[WarId],
            scope: &MemberScope,
        ) -> Result<Vec<WarMembership>, FetchError> {
            self.check(FetchStage::Members)?;
            self.inner.fetch_war_members(war_ids, scope).await
        }

        async fn fetch_attacks(
            &self,
            war_ids: &[WarId],
            clan_tag: &Tag,
            player_tag: Option<&Tag>,
        ) -> Result<Vec<AttackFact>, FetchError> {
            self.check(FetchStage::Attacks)?;
            self.inner.fetch_attacks(war_ids, clan_tag, player_tag).await
        }

        async fn fetch_activity_events(
            &self,
            clan_tag: &Tag,
            player_tag: &Tag,
            period_start: DateTime<Utc>,
            period_end: DateTime<Utc>,
        ) -> Result<Vec<ActivityEvent>, FetchError> {
            self.check(FetchStage::Activity)?;
            self.inner
                .fetch_activity_events(clan_tag, player_tag, period_start, period_end)
                .await
        }

        async fn fetch_defender_town_halls(
            &self,
            war_ids: &[WarId],
            defender_tags: &[Tag],
        ) -> Result<HashMap<DefenderKey, u8>, FetchError> {
            self.check(FetchStage::Defenders)?;
            self.inner
                .fetch_defender_town_halls(war_ids, defender_tags)
                .await
        }
    }

    #[tokio::test]
    async fn test_fetch_errors_name_the_stage() {
        for stage in [
            FetchStage::Wars,
            FetchStage::Members,
            FetchStage::Attacks,
            FetchStage::Defenders,
        ] {
            let engine = WarIntelligenceEngine::new(FailingSource {
                inner: fixture(),
                fail: stage,
            });
            let err = engine.compute(&options()).await.unwrap_err();

            assert_eq!(err.stage(), Some(stage));
            assert!(err.to_string().contains(&stage.to_string()));
        }
    }

    #[tokio::test]
    async fn test_activity_fetch_error_only_when_consulted() {
        let engine = WarIntelligenceEngine::new(FailingSource {
            inner: fixture(),
            fail: FetchStage::Activity,
        });

        // Alice has attack rows, so the activity log is never read
        assert!(engine.compute(&options().with_player(ALICE)).await.is_ok());

        let err = engine
            .compute(&options().with_player(DAVE))
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(FetchStage::Activity));
    }
}
