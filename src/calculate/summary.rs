//! Clan baselines, ranking and the latest-war spotlight.

use std::cmp::Ordering;

use crate::models::{ClanAverages, TopAttacker, War, WarIntelligenceMetrics, WarSummary};
use crate::reconcile::WarContribution;

/// Default number of attackers listed in the spotlight.
pub const DEFAULT_TOP_ATTACKERS: usize = 5;

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Average the eligible players' scores.
///
/// Hold rate is averaged only over players with defense data, and is 0 when
/// nobody has any.
pub fn clan_averages(metrics: &[WarIntelligenceMetrics]) -> ClanAverages {
    ClanAverages {
        average_aei: mean(metrics.iter().map(|m| m.attack_efficiency_index)),
        average_consistency: mean(metrics.iter().map(|m| m.consistency_score)),
        average_hold_rate: mean(metrics.iter().filter_map(|m| m.defensive_hold_rate)),
        average_overall_score: mean(metrics.iter().map(|m| m.overall_score)),
    }
}

/// Sort by composite score, highest first; ties go to the lower player tag.
pub fn rank(metrics: &mut [WarIntelligenceMetrics]) {
    metrics.sort_by(|a, b| {
        b.overall_score
            .partial_cmp(&a.overall_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.player_tag.cmp(&b.player_tag))
    });
}

/// The most recent war: latest start (or end) time, then highest id.
pub fn latest_war(wars: &[War]) -> Option<&War> {
    wars.iter().max_by(|a, b| {
        a.reference_time()
            .cmp(&b.reference_time())
            .then_with(|| a.id.cmp(&b.id))
    })
}

/// Build the spotlight for the most recent war.
pub fn latest_war_summary(
    wars: &[War],
    contributions: &[WarContribution],
    top_n: usize,
) -> Option<WarSummary> {
    let war = latest_war(wars)?;

    let in_war: Vec<&WarContribution> = contributions
        .iter()
        .filter(|c| c.war_id.as_ref() == Some(&war.id))
        .collect();

    let attacks_used: u32 = in_war.iter().map(|c| c.attacks).sum();
    let stars: u32 = in_war.iter().map(|c| c.stars).sum();
    let attacks_available = war.attacks_available();

    let mut attackers: Vec<TopAttacker> = in_war
        .iter()
        .filter(|c| c.attacks > 0)
        .map(|c| TopAttacker {
            player_tag: c.player_tag.clone(),
            player_name: c.player_name.clone(),
            attacks: c.attacks,
            stars: c.stars,
            destruction: c.destruction,
        })
        .collect();
    attackers.sort_by(|a, b| {
        b.stars
            .cmp(&a.stars)
            .then_with(|| {
                b.destruction
                    .partial_cmp(&a.destruction)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.player_tag.cmp(&b.player_tag))
    });
    attackers.truncate(top_n);

    Some(WarSummary {
        war_id: war.id.clone(),
        opponent_name: war.opponent_name.clone(),
        start_time: war.start_time,
        end_time: war.end_time,
        result: war.result,
        team_size: war.team_size,
        clan_stars: war.clan_stars,
        opponent_stars: war.opponent_stars,
        attacks_used,
        attacks_available,
        missed_attacks: attacks_available.saturating_sub(attacks_used),
        average_stars: if attacks_used == 0 {
            0.0
        } else {
            stars as f64 / attacks_used as f64
        },
        top_attackers: attackers,
    })
}
