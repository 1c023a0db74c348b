//! Ordered fallback strategies.
//!
//! Each strategy inspects the evidence for one fact and either answers or
//! passes. The first answer wins.

use super::{WarContribution, WarEvidence};
use crate::models::WarMembership;

/// Strategy resolving the attack count of a membership row.
pub type AttackCountResolver = fn(&WarMembership) -> Option<u32>;

/// Strategy turning one player's evidence for one war into a contribution.
pub type ContributionResolver = fn(&WarEvidence<'_>) -> Option<WarContribution>;

/// Attack-count strategies in priority order.
pub const ATTACK_COUNT_RESOLVERS: [AttackCountResolver; 3] =
    [explicit_counter, embedded_attacks, implied_by_stars];

/// Contribution strategies in priority order.
pub const CONTRIBUTION_RESOLVERS: [ContributionResolver; 2] =
    [from_structured_attacks, from_membership_counters];

/// Attack counter, when recorded and positive.
pub fn explicit_counter(row: &WarMembership) -> Option<u32> {
    row.attacks.filter(|&n| n > 0)
}

/// Number of raw attacks embedded by the ingestion job.
pub fn embedded_attacks(row: &WarMembership) -> Option<u32> {
    if row.raw_attacks.is_empty() {
        None
    } else {
        Some(row.raw_attacks.len() as u32)
    }
}

/// Stars without a count still mean at least one attack happened.
pub fn implied_by_stars(row: &WarMembership) -> Option<u32> {
    row.stars.filter(|&s| s > 0).map(|_| 1)
}

/// Resolve a membership row's attack count, 0 when nothing applies.
pub fn resolve_attack_count(row: &WarMembership) -> u32 {
    ATTACK_COUNT_RESOLVERS
        .iter()
        .find_map(|resolve| resolve(row))
        .unwrap_or(0)
}

/// Build from individual attack rows.
///
/// The count never drops below what the membership row reports. When the
/// membership row claims more attacks than were recorded individually, its
/// star and destruction totals are used instead of the partial sums.
pub fn from_structured_attacks(evidence: &WarEvidence<'_>) -> Option<WarContribution> {
    if evidence.facts.is_empty() {
        return None;
    }

    let structured = evidence.facts.len() as u32;
    let fact_stars: u32 = evidence.facts.iter().map(|f| f.stars as u32).sum();
    let fact_destruction: f64 = evidence.facts.iter().map(|f| f.destruction).sum();

    let counted = evidence.membership.map(resolve_attack_count).unwrap_or(0);
    let (stars, destruction) = match evidence.membership {
        Some(row) if counted > structured => (
            row.stars.unwrap_or(fact_stars),
            row.destruction.unwrap_or(fact_destruction),
        ),
        _ => (fact_stars, fact_destruction),
    };

    let mut contribution = evidence.empty_contribution();
    contribution.attacks = structured.max(counted);
    contribution.stars = stars;
    contribution.destruction = destruction;
    contribution.facts = evidence.facts.clone();
    Some(contribution)
}

/// Build from the membership row's aggregate counters.
pub fn from_membership_counters(evidence: &WarEvidence<'_>) -> Option<WarContribution> {
    let row = evidence.membership?;

    let raw_stars: u32 = row.raw_attacks.iter().map(|a| a.stars as u32).sum();
    let raw_destruction: f64 = row.raw_attacks.iter().map(|a| a.destruction).sum();

    let mut contribution = evidence.empty_contribution();
    contribution.attacks = resolve_attack_count(row);
    contribution.stars = row.stars.unwrap_or(raw_stars);
    contribution.destruction = row.destruction.unwrap_or(raw_destruction);
    contribution.facts = evidence.embedded_facts.clone();
    Some(contribution)
}

/// Run the contribution chain.
pub fn resolve_contribution(evidence: &WarEvidence<'_>) -> Option<WarContribution> {
    CONTRIBUTION_RESOLVERS
        .iter()
        .find_map(|resolve| resolve(evidence))
}
