//! ISO-week bucketing.

use chrono::{DateTime, Datelike, Duration, Utc};

use crate::models::{AttackFact, War, WeekKey};

/// Week containing `at`: the Monday 00:00 UTC on or before it.
pub fn week_key(at: DateTime<Utc>) -> WeekKey {
    let date = at.date_naive();
    let offset = date.weekday().num_days_from_monday() as i64;
    WeekKey::from_monday(date - Duration::days(offset))
}

/// Week of a war, taken from its start time.
pub fn war_week(war: &War) -> Option<WeekKey> {
    war.start_time.map(week_key)
}

/// Week an attack is counted in.
///
/// The war's start wins; an attack without a resolvable war start falls back
/// to its own timestamp. Attacks with neither have no week and appear only in
/// all-time totals.
pub fn attack_week(fact: &AttackFact, war: Option<&War>) -> Option<WeekKey> {
    war.and_then(war_week)
        .or_else(|| fact.timestamp.map(week_key))
}
