//! Fact reconciliation.
//!
//! Merges structured attack rows, membership counters and (for single-player
//! runs with no attack rows) the activity log into one `WarContribution` per
//! player per war. Pure: no I/O, no clock.

mod activity;
mod resolvers;

pub use activity::reconstruct_attacks;
pub use resolvers::{
    resolve_attack_count, resolve_contribution, AttackCountResolver, ContributionResolver,
    ATTACK_COUNT_RESOLVERS, CONTRIBUTION_RESOLVERS,
};

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Duration;
use tracing::{debug, info};

use crate::calculate::bucket;
use crate::models::{
    ActivityEvent, AttackFact, DefenderKey, MemberSide, Tag, War, WarId, WarMembership, WeekKey,
};

/// Raw rows for one engine run.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileInput<'a> {
    pub wars: &'a [War],
    pub members: &'a [WarMembership],
    pub attacks: &'a [AttackFact],
    pub activity: &'a [ActivityEvent],
    pub defender_town_halls: &'a HashMap<DefenderKey, u8>,
    /// Set for single-player runs
    pub player: Option<&'a Tag>,
}

/// One player's resolved part in one war.
///
/// Attacks reconstructed without a war each become their own contribution
/// with `war_id == None`.
#[derive(Debug, Clone, PartialEq)]
pub struct WarContribution {
    pub player_tag: Tag,
    pub player_name: String,
    pub war_id: Option<WarId>,
    pub week: Option<WeekKey>,
    pub town_hall_level: Option<u8>,
    pub attacks: u32,
    pub stars: u32,
    pub destruction: f64,
    pub defenses: u32,
    pub defense_destruction: f64,
    pub facts: Vec<AttackFact>,
}

/// Everything known about one player in one war, before resolution.
#[derive(Debug, Clone)]
pub struct WarEvidence<'a> {
    pub player_tag: Tag,
    pub player_name: String,
    pub war_id: Option<WarId>,
    pub war: Option<&'a War>,
    pub membership: Option<&'a WarMembership>,
    /// Structured (or reconstructed) attack rows
    pub facts: Vec<AttackFact>,
    /// Attacks embedded in the membership row
    pub embedded_facts: Vec<AttackFact>,
}

impl WarEvidence<'_> {
    /// Contribution carrying identity, week and defense data but no attacks.
    pub fn empty_contribution(&self) -> WarContribution {
        let week = self
            .war
            .and_then(bucket::war_week)
            .or_else(|| {
                self.facts
                    .iter()
                    .chain(self.embedded_facts.iter())
                    .find_map(|f| bucket::attack_week(f, self.war))
            });

        WarContribution {
            player_tag: self.player_tag.clone(),
            player_name: self.player_name.clone(),
            war_id: self.war_id.clone(),
            week,
            town_hall_level: self.membership.and_then(|m| m.town_hall_level),
            attacks: 0,
            stars: 0,
            destruction: 0.0,
            defenses: self.membership.and_then(|m| m.defense_count).unwrap_or(0),
            defense_destruction: self
                .membership
                .and_then(|m| m.defense_destruction)
                .unwrap_or(0.0),
            facts: Vec::new(),
        }
    }
}

#[derive(Default)]
struct Group<'a> {
    name: String,
    membership: Option<&'a WarMembership>,
    facts: Vec<AttackFact>,
    embedded: Vec<AttackFact>,
}

/// Town-Hall levels of both sides, keyed by war and player.
struct TownHallLookup {
    home: HashMap<DefenderKey, u8>,
    away: HashMap<DefenderKey, u8>,
}

impl TownHallLookup {
    fn build(members: &[WarMembership], fetched: &HashMap<DefenderKey, u8>) -> Self {
        let mut home = HashMap::new();
        let mut away = fetched.clone();

        for m in members {
            let Some(th) = m.town_hall_level else {
                continue;
            };
            let key = DefenderKey::new(m.war_id.clone(), m.player_tag.clone());
            match m.side {
                MemberSide::Home => {
                    home.insert(key, th);
                }
                MemberSide::Away => {
                    away.entry(key).or_insert(th);
                }
            }
        }

        Self { home, away }
    }

    fn enrich(&self, fact: &mut AttackFact) {
        let Some(war_id) = fact.war_id.clone() else {
            return;
        };
        if fact.attacker_town_hall.is_none() {
            let key = DefenderKey::new(war_id.clone(), fact.attacker_tag.clone());
            fact.attacker_town_hall = self.home.get(&key).copied();
        }
        if fact.defender_town_hall.is_none() {
            if let Some(defender) = &fact.defender_tag {
                let key = DefenderKey::new(war_id, defender.clone());
                fact.defender_town_hall = self.away.get(&key).copied();
            }
        }
    }
}

/// Convert a membership row's embedded attacks into facts.
fn embedded_facts(row: &WarMembership) -> Vec<AttackFact> {
    row.raw_attacks
        .iter()
        .map(|raw| AttackFact {
            war_id: Some(row.war_id.clone()),
            attacker_tag: row.player_tag.clone(),
            attacker_name: row.player_name.clone(),
            defender_tag: raw.defender_tag.clone(),
            stars: raw.stars,
            destruction: raw.destruction,
            timestamp: None,
            order_index: raw.order,
            attacker_town_hall: row.town_hall_level,
            defender_town_hall: None,
            position_percentile: None,
        })
        .collect()
}

/// Attack-order span of each war: the larger of the home clan's attack
/// allowance and the highest order index seen.
fn order_spans<'a>(
    wars: &HashMap<&WarId, &War>,
    facts: impl Iterator<Item = &'a AttackFact>,
) -> HashMap<WarId, u32> {
    let mut spans: HashMap<WarId, u32> = wars
        .iter()
        .map(|(id, w)| ((*id).clone(), w.attacks_available()))
        .collect();

    for fact in facts {
        if let (Some(id), Some(order)) = (&fact.war_id, fact.order_index) {
            let span = spans.entry(id.clone()).or_insert(0);
            *span = (*span).max(order);
        }
    }
    spans
}

fn set_position(fact: &mut AttackFact, spans: &HashMap<WarId, u32>) {
    fact.position_percentile = match (&fact.war_id, fact.order_index) {
        (Some(id), Some(order)) => spans
            .get(id)
            .filter(|&&span| span > 0)
            .map(|&span| (100.0 * order as f64 / span as f64).clamp(0.0, 100.0)),
        _ => None,
    };
}

/// Resolve every player's contributions.
///
/// Output is ordered by player tag, then war id, with war-less attacks last
/// for each player.
pub fn reconcile(
    input: &ReconcileInput<'_>,
    default_war_duration: Duration,
) -> Vec<WarContribution> {
    let war_index: HashMap<&WarId, &War> = input.wars.iter().map(|w| (&w.id, w)).collect();

    let mut facts: Vec<AttackFact> = match input.player {
        Some(player) if input.attacks.is_empty() => {
            let rebuilt = reconstruct_attacks(input.activity, input.wars, default_war_duration);
            if !rebuilt.is_empty() {
                info!(
                    "No attack rows for {}, rebuilt {} attacks from activity log",
                    player,
                    rebuilt.len()
                );
            }
            rebuilt
        }
        _ => input.attacks.to_vec(),
    };
    if let Some(player) = input.player {
        facts.retain(|f| &f.attacker_tag == player);
    }

    // Opponent attacks are not ours to score
    let away: HashSet<DefenderKey> = input
        .members
        .iter()
        .filter(|m| m.side == MemberSide::Away)
        .map(|m| DefenderKey::new(m.war_id.clone(), m.player_tag.clone()))
        .collect();
    let before = facts.len();
    facts.retain(|f| match &f.war_id {
        Some(id) => !away.contains(&DefenderKey::new(id.clone(), f.attacker_tag.clone())),
        None => true,
    });
    if facts.len() < before {
        debug!("Dropped {} attacks made by the opponent", before - facts.len());
    }

    let home_rows: Vec<&WarMembership> = input
        .members
        .iter()
        .filter(|m| m.side == MemberSide::Home)
        .filter(|m| input.player.map_or(true, |p| &m.player_tag == p))
        .collect();

    let lookup = TownHallLookup::build(input.members, input.defender_town_halls);

    let mut groups: BTreeMap<(Tag, WarId), Group<'_>> = BTreeMap::new();
    let mut orphans: BTreeMap<Tag, Vec<AttackFact>> = BTreeMap::new();

    for &row in &home_rows {
        let group = groups
            .entry((row.player_tag.clone(), row.war_id.clone()))
            .or_default();
        group.name = row.player_name.clone();
        group.membership = Some(row);
        group.embedded = embedded_facts(row);
    }

    let spans = order_spans(
        &war_index,
        facts
            .iter()
            .chain(groups.values().flat_map(|g| g.embedded.iter())),
    );

    for group in groups.values_mut() {
        for fact in group.embedded.iter_mut() {
            lookup.enrich(fact);
            set_position(fact, &spans);
        }
    }

    for mut fact in facts {
        lookup.enrich(&mut fact);
        set_position(&mut fact, &spans);
        match fact.war_id.clone() {
            Some(war_id) => {
                let group = groups
                    .entry((fact.attacker_tag.clone(), war_id))
                    .or_default();
                if group.name.is_empty() {
                    group.name = fact.attacker_name.clone();
                }
                group.facts.push(fact);
            }
            None => orphans.entry(fact.attacker_tag.clone()).or_default().push(fact),
        }
    }

    let mut contributions = Vec::with_capacity(groups.len());
    for ((player_tag, war_id), group) in groups {
        let evidence = WarEvidence {
            player_tag,
            player_name: group.name,
            war: war_index.get(&war_id).copied(),
            war_id: Some(war_id),
            membership: group.membership,
            facts: group.facts,
            embedded_facts: group.embedded,
        };
        if let Some(contribution) = resolve_contribution(&evidence) {
            contributions.push(contribution);
        }
    }

    for (player_tag, facts) in orphans {
        for fact in facts {
            contributions.push(WarContribution {
                player_tag: player_tag.clone(),
                player_name: fact.attacker_name.clone(),
                war_id: None,
                week: bucket::attack_week(&fact, None),
                town_hall_level: fact.attacker_town_hall,
                attacks: 1,
                stars: fact.stars as u32,
                destruction: fact.destruction,
                defenses: 0,
                defense_destruction: 0.0,
                facts: vec![fact],
            });
        }
    }

    contributions.sort_by(|a, b| {
        a.player_tag
            .cmp(&b.player_tag)
            .then_with(|| a.war_id.is_none().cmp(&b.war_id.is_none()))
            .then_with(|| a.war_id.cmp(&b.war_id))
    });

    debug!("Reconciled {} contributions", contributions.len());
    contributions
}
