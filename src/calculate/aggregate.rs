//! Per-player accumulation.
//!
//! The same `add` runs for the all-time aggregate and for each weekly
//! bucket, so summing a player's weeks gives back the all-time totals
//! whenever every contribution has a week.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::{AttackFact, PlayerWeekKey, Tag, WarId, WeekKey};
use crate::reconcile::WarContribution;

/// Running totals for one player over some span of time.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerAggregate {
    pub player_tag: Tag,
    pub player_name: String,
    pub town_hall_level: Option<u8>,
    /// Every war with membership or attack evidence
    pub wars: BTreeSet<WarId>,
    /// Wars with at least one attack
    pub wars_with_attacks: BTreeSet<WarId>,
    pub attacks: u32,
    pub stars: u32,
    pub destruction: f64,
    pub defenses: u32,
    pub defense_destruction: f64,
    pub facts: Vec<AttackFact>,
}

impl PlayerAggregate {
    pub fn new(player_tag: Tag, player_name: String) -> Self {
        Self {
            player_tag,
            player_name,
            town_hall_level: None,
            wars: BTreeSet::new(),
            wars_with_attacks: BTreeSet::new(),
            attacks: 0,
            stars: 0,
            destruction: 0.0,
            defenses: 0,
            defense_destruction: 0.0,
            facts: Vec::new(),
        }
    }

    /// Fold one contribution in.
    pub fn add(&mut self, c: &WarContribution) {
        if self.player_name.is_empty() {
            self.player_name = c.player_name.clone();
        }
        // Town Halls only ever go up
        self.town_hall_level = self.town_hall_level.max(c.town_hall_level);

        if let Some(war_id) = &c.war_id {
            self.wars.insert(war_id.clone());
            if c.attacks > 0 {
                self.wars_with_attacks.insert(war_id.clone());
            }
        }

        self.attacks += c.attacks;
        self.stars += c.stars;
        self.destruction += c.destruction;
        self.defenses += c.defenses;
        self.defense_destruction += c.defense_destruction;
        self.facts.extend(c.facts.iter().cloned());
    }

    pub fn total_wars(&self) -> u32 {
        self.wars.len() as u32
    }

    /// Longest run of consecutive wars (ordered by id) with an attack.
    pub fn longest_attack_streak(&self) -> u32 {
        let mut best = 0;
        let mut current = 0;
        for war_id in &self.wars {
            if self.wars_with_attacks.contains(war_id) {
                current += 1;
                best = best.max(current);
            } else {
                current = 0;
            }
        }
        best
    }
}

/// All-time and weekly aggregates for a run.
#[derive(Debug, Clone, Default)]
pub struct Aggregates {
    /// Ordered by player tag
    pub all_time: BTreeMap<Tag, PlayerAggregate>,
    pub weekly: BTreeMap<PlayerWeekKey, PlayerAggregate>,
}

impl Aggregates {
    /// A player's weekly aggregates, oldest week first.
    pub fn weeks_for<'a>(
        &'a self,
        player: &'a Tag,
    ) -> impl Iterator<Item = (WeekKey, &'a PlayerAggregate)> {
        self.weekly
            .iter()
            .filter(move |(key, _)| &key.player == player)
            .map(|(key, agg)| (key.week, agg))
    }
}

/// Fold contributions into all-time and per-week aggregates.
pub fn aggregate(contributions: &[WarContribution]) -> Aggregates {
    let mut out = Aggregates::default();

    for c in contributions {
        out.all_time
            .entry(c.player_tag.clone())
            .or_insert_with(|| PlayerAggregate::new(c.player_tag.clone(), c.player_name.clone()))
            .add(c);

        if let Some(week) = c.week {
            out.weekly
                .entry(PlayerWeekKey::new(c.player_tag.clone(), week))
                .or_insert_with(|| {
                    PlayerAggregate::new(c.player_tag.clone(), c.player_name.clone())
                })
                .add(c);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculate::bucket::week_key;
    use chrono::{TimeZone, Utc};

    fn contribution(
        tag: &str,
        war: Option<&str>,
        day: Option<u32>,
        attacks: u32,
    ) -> WarContribution {
        WarContribution {
            player_tag: Tag::from(tag),
            player_name: tag.to_lowercase(),
            war_id: war.map(WarId::from),
            week: day.map(|d| week_key(Utc.with_ymd_and_hms(2025, 6, d, 12, 0, 0).unwrap())),
            town_hall_level: Some(14),
            attacks,
            stars: attacks * 2,
            destruction: attacks as f64 * 75.5,
            defenses: 1,
            defense_destruction: 55.0,
            facts: Vec::new(),
        }
    }

    #[test]
    fn test_wars_are_a_set() {
        let mut agg = PlayerAggregate::new(Tag::from("#P1"), "p1".to_string());
        agg.add(&contribution("#P1", Some("w1"), Some(2), 1));
        agg.add(&contribution("#P1", Some("w1"), Some(2), 1));
        agg.add(&contribution("#P1", None, Some(2), 1));

        assert_eq!(agg.total_wars(), 1);
        assert_eq!(agg.attacks, 3);
    }

    #[test]
    fn test_longest_streak_by_war_id() {
        let mut agg = PlayerAggregate::new(Tag::from("#P1"), "p1".to_string());
        for (war, attacks) in [("w1", 2), ("w2", 1), ("w3", 0), ("w4", 2), ("w5", 2), ("w6", 1)] {
            agg.add(&contribution("#P1", Some(war), Some(2), attacks));
        }

        assert_eq!(agg.total_wars(), 6);
        assert_eq!(agg.longest_attack_streak(), 3);
    }

    #[test]
    fn test_streak_zero_without_attacks() {
        let mut agg = PlayerAggregate::new(Tag::from("#P1"), "p1".to_string());
        agg.add(&contribution("#P1", Some("w1"), Some(2), 0));
        assert_eq!(agg.longest_attack_streak(), 0);
    }

    #[test]
    fn test_town_hall_keeps_highest() {
        let mut agg = PlayerAggregate::new(Tag::from("#P1"), "p1".to_string());
        let mut old = contribution("#P1", Some("w1"), Some(2), 1);
        old.town_hall_level = Some(13);
        let mut unknown = contribution("#P1", Some("w3"), Some(2), 1);
        unknown.town_hall_level = None;
        agg.add(&contribution("#P1", Some("w2"), Some(2), 1));
        agg.add(&old);
        agg.add(&unknown);

        assert_eq!(agg.town_hall_level, Some(14));
    }

    #[test]
    fn test_weekly_buckets_sum_to_all_time() {
        let contributions = vec![
            contribution("#P1", Some("w1"), Some(2), 2),
            contribution("#P1", Some("w2"), Some(5), 1),
            contribution("#P1", Some("w3"), Some(10), 2),
            contribution("#P1", None, Some(17), 1),
            contribution("#P2", Some("w1"), Some(2), 1),
        ];

        let aggs = aggregate(&contributions);
        let player = Tag::from("#P1");
        let all_time = &aggs.all_time[&player];
        let weeks: Vec<_> = aggs.weeks_for(&player).map(|(_, w)| w).collect();

        assert_eq!(weeks.len(), 3);
        assert_eq!(weeks.iter().map(|w| w.attacks).sum::<u32>(), all_time.attacks);
        assert_eq!(weeks.iter().map(|w| w.stars).sum::<u32>(), all_time.stars);
        let destruction: f64 = weeks.iter().map(|w| w.destruction).sum();
        assert!((destruction - all_time.destruction).abs() < 1e-9);
        assert_eq!(weeks.iter().map(|w| w.defenses).sum::<u32>(), all_time.defenses);
    }

    #[test]
    fn test_unbucketed_contribution_only_in_all_time() {
        let aggs = aggregate(&[
            contribution("#P1", Some("w1"), Some(2), 1),
            contribution("#P1", None, None, 1),
        ]);
        let player = Tag::from("#P1");

        assert_eq!(aggs.all_time[&player].attacks, 2);
        assert_eq!(aggs.weeks_for(&player).map(|(_, w)| w.attacks).sum::<u32>(), 1);
    }

    #[test]
    fn test_weeks_are_ordered() {
        let aggs = aggregate(&[
            contribution("#P1", Some("w3"), Some(20), 1),
            contribution("#P1", Some("w1"), Some(2), 1),
        ]);
        let player = Tag::from("#P1");
        let weeks: Vec<_> = aggs.weeks_for(&player).collect();

        assert!(weeks[0].0 < weeks[1].0);
        assert!(weeks[0].1.wars.contains(&WarId::from("w1")));
        assert!(weeks[1].1.wars.contains(&WarId::from("w3")));
    }
}
