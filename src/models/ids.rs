//! Identifier newtypes and composite map keys.

use std::fmt;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Characters the game uses in player and clan tags.
const TAG_PATTERN: &str = "^[0289PYLQGRJCUV]{3,15}$";

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TAG_PATTERN).expect("tag pattern is valid"))
}

/// A normalized clan or player tag, always stored as `#XXXX`.
///
/// Deserializing goes through [`Tag::parse`], so stored rows written as
/// `2pr8r8v8p` still match option tags.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag(String);

impl Tag {
    /// Normalize user input into a canonical tag.
    ///
    /// Trims whitespace, strips a leading `#`, uppercases and maps the letter
    /// `O` to the digit `0`. Returns `None` when the result contains
    /// characters the game never issues.
    pub fn parse(raw: &str) -> Option<Self> {
        let body: String = raw
            .trim()
            .trim_start_matches('#')
            .to_uppercase()
            .chars()
            .map(|c| if c == 'O' { '0' } else { c })
            .collect();

        if tag_regex().is_match(&body) {
            Some(Self(format!("#{}", body)))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.0)
    }
}

impl TryFrom<String> for Tag {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Tag::parse(&raw).ok_or_else(|| format!("invalid tag: {:?}", raw))
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.0
    }
}

/// Wraps the string as-is, without normalizing.
impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Store-assigned war identifier.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarId(String);

impl WarId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for WarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WarId({})", self.0)
    }
}

impl From<&str> for WarId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WarId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lookup key for a base in a specific war: `(war, player tag)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DefenderKey {
    pub war_id: WarId,
    pub tag: Tag,
}

impl DefenderKey {
    pub fn new(war_id: WarId, tag: Tag) -> Self {
        Self { war_id, tag }
    }
}

/// Monday (UTC) starting an ISO week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekKey(NaiveDate);

impl WeekKey {
    /// Callers must pass a Monday; see `calculate::bucket::week_key`.
    pub(crate) fn from_monday(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn start_date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Key of a per-player weekly bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayerWeekKey {
    pub player: Tag,
    pub week: WeekKey,
}

impl PlayerWeekKey {
    pub fn new(player: Tag, week: WeekKey) -> Self {
        Self { player, week }
    }
}
