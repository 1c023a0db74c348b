//! Attack reconstruction from the activity log.

use chrono::Duration;
use tracing::warn;

use crate::models::{ActivityEvent, AttackFact, War, WarId};

/// Rebuild attack facts from `war_attack` events.
///
/// An event is tied to a war only when exactly one war of the event's clan
/// covers its timestamp. Events matching no war, or several overlapping
/// league wars, keep a null war id.
pub fn reconstruct_attacks(
    events: &[ActivityEvent],
    wars: &[War],
    default_war_duration: Duration,
) -> Vec<AttackFact> {
    events
        .iter()
        .filter(|e| e.is_war_attack())
        .map(|event| AttackFact {
            war_id: match_war(event, wars, default_war_duration),
            attacker_tag: event.player_tag.clone(),
            attacker_name: event
                .player_name
                .clone()
                .unwrap_or_else(|| event.player_tag.to_string()),
            defender_tag: event.metadata.defender_tag.clone(),
            stars: event.value.round().clamp(0.0, 3.0) as u8,
            destruction: event.metadata.destruction.unwrap_or(0.0).clamp(0.0, 100.0),
            timestamp: Some(event.occurred_at),
            order_index: event.metadata.order_index,
            attacker_town_hall: None,
            defender_town_hall: None,
            position_percentile: None,
        })
        .collect()
}

fn match_war(event: &ActivityEvent, wars: &[War], default_duration: Duration) -> Option<WarId> {
    let mut candidates = wars
        .iter()
        .filter(|w| w.clan_tag == event.clan_tag)
        .filter(|w| w.contains(event.occurred_at, default_duration));

    let first = candidates.next()?;
    if candidates.next().is_some() {
        warn!(
            "Activity event for {} at {} overlaps several wars, leaving it unmatched",
            event.player_tag, event.occurred_at
        );
        return None;
    }
    Some(first.id.clone())
}
