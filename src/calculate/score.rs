//! Scoring engine.
//!
//! Turns one `PlayerAggregate` into sub-scores, a composite and a tier.
//! The same function scores the all-time aggregate and every weekly bucket.

use crate::models::{
    AttackFact, PerformanceTier, WarIntelligenceMetrics, WeekKey, WeeklyPerformance,
};

use super::aggregate::PlayerAggregate;

/// Composite weight of the attack efficiency index.
pub const WEIGHT_AEI: f64 = 0.40;
/// Composite weight of the consistency score.
pub const WEIGHT_CONSISTENCY: f64 = 0.30;
/// Composite weight of the defensive hold rate (as a percentage).
pub const WEIGHT_HOLD: f64 = 0.20;
/// Composite weight of the attack timing score.
pub const WEIGHT_TIMING: f64 = 0.10;

/// Attacks per war a player is expected to use.
pub const ATTACKS_PER_WAR: f64 = 2.0;

/// Score for matchups or timings that cannot be judged.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Calculate the attack efficiency index (0-100).
pub fn attack_efficiency_index(avg_stars: f64, avg_destruction: f64, cleanup_rate: f64) -> f64 {
    ((avg_stars / 3.0) * 60.0 + (avg_destruction / 100.0) * 30.0 + cleanup_rate * 10.0)
        .clamp(0.0, 100.0)
}

/// Share of attacks made from a stronger base.
pub fn cleanup_rate(facts: &[AttackFact]) -> f64 {
    ratio(facts.iter().filter(|f| f.is_cleanup()).count(), facts.len())
}

/// Share of attacks that land in the last quartile of the player's ordered
/// attacks and still take at least two stars.
pub fn clutch_factor(facts: &[AttackFact]) -> f64 {
    let mut ordered: Vec<&AttackFact> = facts.iter().collect();
    // Stable, unknown order last
    ordered.sort_by_key(|f| (f.order_index.is_none(), f.order_index));

    let n = ordered.len();
    let cutoff = n * 3 / 4;
    let clutch = ordered
        .iter()
        .enumerate()
        .filter(|(i, f)| *i >= cutoff && f.stars >= 2)
        .count();

    ratio(clutch, n)
}

/// Attacks per available attack slot, capped at 1.
pub fn participation_rate(attacks: u32, wars: u32) -> f64 {
    if wars == 0 {
        0.0
    } else {
        (attacks as f64 / (wars as f64 * ATTACKS_PER_WAR)).min(1.0)
    }
}

/// Calculate the consistency score (0-100).
pub fn consistency_score(participation: f64, streak: u32, wars: u32) -> f64 {
    let streak_ratio = if wars == 0 {
        0.0
    } else {
        streak as f64 / wars as f64
    };
    (participation * 70.0 + streak_ratio * 30.0).clamp(0.0, 100.0)
}

/// Fraction of base held on defense, `None` without defenses.
pub fn defensive_hold_rate(defenses: u32, defense_destruction: f64) -> Option<f64> {
    if defenses == 0 {
        return None;
    }
    let avg = defense_destruction / defenses as f64;
    Some((1.0 - avg / 100.0).clamp(0.0, 1.0))
}

/// Timing score of a single attack.
fn timing_points(fact: &AttackFact) -> f64 {
    match fact.position_percentile {
        Some(p) if (25.0..=75.0).contains(&p) => 100.0,
        Some(_) => 75.0,
        None => NEUTRAL_SCORE,
    }
}

/// Average timing score (0-100). Mid-war attacks score highest.
pub fn attack_timing_score(facts: &[AttackFact]) -> f64 {
    if facts.is_empty() {
        return NEUTRAL_SCORE;
    }
    facts.iter().map(timing_points).sum::<f64>() / facts.len() as f64
}

/// Success rate on equal or stronger bases (0-100), neutral without any.
pub fn target_selection_quality(facts: &[AttackFact]) -> f64 {
    let (attempts, successes) = facts
        .iter()
        .filter(|f| f.is_even_or_up())
        .fold((0usize, 0usize), |(n, s), f| {
            (n + 1, s + usize::from(f.stars >= 2))
        });

    if attempts == 0 {
        NEUTRAL_SCORE
    } else {
        100.0 * successes as f64 / attempts as f64
    }
}

/// Attacks on equal or stronger bases that took at most one star.
pub fn failed_attacks(facts: &[AttackFact]) -> u32 {
    facts
        .iter()
        .filter(|f| f.is_even_or_up() && f.stars <= 1)
        .count() as u32
}

/// Weighted blend of the sub-scores.
///
/// Without defense data the hold weight is dropped and the rest are scaled
/// to sum to 1.
pub fn overall_score(aei: f64, consistency: f64, hold_rate: Option<f64>, timing: f64) -> f64 {
    let mut total = aei * WEIGHT_AEI + consistency * WEIGHT_CONSISTENCY + timing * WEIGHT_TIMING;
    let mut weight = WEIGHT_AEI + WEIGHT_CONSISTENCY + WEIGHT_TIMING;

    if let Some(hold) = hold_rate {
        total += hold * 100.0 * WEIGHT_HOLD;
        weight += WEIGHT_HOLD;
    }

    (total / weight).clamp(0.0, 100.0)
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Score one aggregate. Returns `None` when the player made no attacks.
pub fn score(agg: &PlayerAggregate) -> Option<WarIntelligenceMetrics> {
    if agg.attacks == 0 {
        return None;
    }

    let attacks = agg.attacks as f64;
    let average_stars = agg.stars as f64 / attacks;
    let average_destruction = agg.destruction / attacks;
    let facts = agg.facts.as_slice();

    let cleanup_efficiency = cleanup_rate(facts);
    let aei = attack_efficiency_index(average_stars, average_destruction, cleanup_efficiency);

    let total_wars = agg.total_wars();
    let streak = agg.longest_attack_streak();
    let participation = participation_rate(agg.attacks, total_wars);
    let consistency = consistency_score(participation, streak, total_wars);

    let hold_rate = defensive_hold_rate(agg.defenses, agg.defense_destruction);
    let timing = attack_timing_score(facts);
    let overall = overall_score(aei, consistency, hold_rate, timing);

    Some(WarIntelligenceMetrics {
        player_tag: agg.player_tag.clone(),
        player_name: agg.player_name.clone(),
        town_hall_level: agg.town_hall_level,
        total_wars,
        total_attacks: agg.attacks,
        total_stars: agg.stars,
        total_destruction: agg.destruction,
        average_stars,
        average_destruction,
        total_defenses: agg.defenses,
        average_defense_destruction: if agg.defenses == 0 {
            0.0
        } else {
            agg.defense_destruction / agg.defenses as f64
        },
        longest_attack_streak: streak,
        failed_attacks: failed_attacks(facts),
        participation_rate: participation,
        cleanup_efficiency,
        clutch_factor: clutch_factor(facts),
        defensive_hold_rate: hold_rate,
        attack_efficiency_index: aei,
        consistency_score: consistency,
        attack_timing_score: timing,
        target_selection_quality: target_selection_quality(facts),
        overall_score: overall,
        tier: PerformanceTier::from_score(overall),
        weekly: Vec::new(),
    })
}

/// Score each week, oldest first, skipping weeks without attacks.
pub fn weekly_series<'a>(
    weeks: impl IntoIterator<Item = (WeekKey, &'a PlayerAggregate)>,
) -> Vec<WeeklyPerformance> {
    let mut series: Vec<WeeklyPerformance> = weeks
        .into_iter()
        .filter_map(|(week, agg)| {
            score(agg).map(|m| WeeklyPerformance {
                week_start: week.start_date(),
                attacks: m.total_attacks,
                stars: m.total_stars,
                average_stars: m.average_stars,
                attack_efficiency_index: m.attack_efficiency_index,
                consistency_score: m.consistency_score,
                defensive_hold_rate: m.defensive_hold_rate,
                attack_timing_score: m.attack_timing_score,
                overall_score: m.overall_score,
                tier: m.tier,
            })
        })
        .collect();
    series.sort_by_key(|w| w.week_start);
    series
}
