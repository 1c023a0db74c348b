//! JSONL (JSON Lines) storage.
//!
//! Each line is one row as synced from the game API. Unparseable lines are
//! skipped with a warning so one bad row never hides a whole war.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{StorageConfig, StorageError};

/// Entity types stored in the data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    War,
    Membership,
    Attack,
    Activity,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::War,
        EntityType::Membership,
        EntityType::Attack,
        EntityType::Activity,
    ];

    /// Get the filename for this entity type.
    pub fn filename(&self) -> &'static str {
        match self {
            EntityType::War => "wars.jsonl",
            EntityType::Membership => "war_members.jsonl",
            EntityType::Attack => "war_attacks.jsonl",
            EntityType::Activity => "activity_events.jsonl",
        }
    }
}

/// JSONL file writer used to seed data directories in tests.
///
/// The engine only reads; rows are synced into the directory by other tools.
#[cfg(test)]
pub struct JsonlWriter<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

#[cfg(test)]
impl<T: serde::Serialize> JsonlWriter<T> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    pub fn for_entity(config: &StorageConfig, entity: EntityType) -> Self {
        Self::new(config.entity_path(entity))
    }

    /// Write rows, replacing the entire file.
    pub fn write_all(&self, rows: &[T]) -> Result<usize, StorageError> {
        use std::io::Write;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = std::io::BufWriter::new(File::create(&self.path)?);
        for row in rows {
            writeln!(writer, "{}", serde_json::to_string(row)?)?;
        }
        writer.flush()?;
        Ok(rows.len())
    }
}

/// Outcome of checking one file line by line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub exists: bool,
    pub valid: usize,
    /// 1-based line numbers that failed to parse
    pub invalid_lines: Vec<usize>,
}

impl FileReport {
    pub fn is_clean(&self) -> bool {
        self.invalid_lines.is_empty()
    }
}

/// JSONL file reader.
pub struct JsonlReader<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> JsonlReader<T> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    pub fn for_entity(config: &StorageConfig, entity: EntityType) -> Self {
        Self::new(config.entity_path(entity))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Walk every non-empty line, handing each parse result to `visit`.
    fn for_each_line<F>(&self, mut visit: F) -> Result<(), StorageError>
    where
        F: FnMut(usize, Result<T, serde_json::Error>),
    {
        let reader = BufReader::new(File::open(&self.path)?);
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            visit(idx + 1, serde_json::from_str(&line));
        }
        Ok(())
    }

    /// Read every parseable row. A missing file reads as empty.
    pub fn read_all(&self) -> Result<Vec<T>, StorageError> {
        if !self.exists() {
            return Ok(Vec::new());
        }

        let mut rows = Vec::new();
        self.for_each_line(|line_num, parsed| match parsed {
            Ok(row) => rows.push(row),
            Err(e) => warn!(
                "Failed to parse line {} in {:?}: {}",
                line_num, self.path, e
            ),
        })?;

        debug!("Read {} rows from {:?}", rows.len(), self.path);
        Ok(rows)
    }

    /// Parse the whole file and report which lines are broken.
    pub fn scan(&self) -> Result<FileReport, StorageError> {
        let mut report = FileReport {
            path: self.path.clone(),
            exists: self.exists(),
            valid: 0,
            invalid_lines: Vec::new(),
        };
        if !report.exists {
            return Ok(report);
        }

        self.for_each_line(|line_num, parsed| match parsed {
            Ok(_) => report.valid += 1,
            Err(_) => report.invalid_lines.push(line_num),
        })?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityEvent, ActivityMetadata, Tag, War, WarId, WarType};
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::TempDir;

    fn war(id: &str, team_size: u32) -> War {
        War {
            id: WarId::from(id),
            clan_tag: Tag::from("#2PR8R8V8P"),
            opponent_tag: None,
            opponent_name: Some("Rivals".to_string()),
            war_type: WarType::Regular,
            start_time: Some(Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()),
            end_time: None,
            team_size,
            result: None,
            clan_stars: 0,
            opponent_stars: 0,
        }
    }

    #[test]
    fn test_jsonl_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("wars.jsonl");
        let wars = vec![war("w1", 15), war("w2", 30)];

        let writer: JsonlWriter<War> = JsonlWriter::new(path.clone());
        assert_eq!(writer.write_all(&wars).unwrap(), 2);

        let reader: JsonlReader<War> = JsonlReader::new(path);
        assert_eq!(reader.read_all().unwrap(), wars);
    }

    #[test]
    fn test_write_all_overwrites_existing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("wars.jsonl");

        let writer: JsonlWriter<War> = JsonlWriter::new(path.clone());
        writer.write_all(&[war("old", 10)]).unwrap();
        writer.write_all(&[war("new", 20)]).unwrap();

        let read = JsonlReader::<War>::new(path).read_all().unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].id, WarId::from("new"));
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let reader: JsonlReader<War> = JsonlReader::new(temp_dir.path().join("missing.jsonl"));

        assert!(!reader.exists());
        assert!(reader.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_read_all_skips_bad_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("activity_events.jsonl");
        fs::write(
            &path,
            r##"{"clanTag":"#2PR8R8V8P","playerTag":"#PQ2","eventType":"war_attack","value":3,"occurredAt":"2025-06-02T14:00:00Z","metadata":{"destruction":100.0}}
not-valid-json

{"clanTag":"#2PR8R8V8P","playerTag":"#PQ2","eventType":"donation","value":40,"occurredAt":"2025-06-03T09:00:00Z"}
"##,
        )
        .unwrap();

        let events: Vec<ActivityEvent> = JsonlReader::new(path).read_all().unwrap();

        assert_eq!(events.len(), 2);
        assert!(events[0].is_war_attack());
        assert_eq!(events[0].metadata.destruction, Some(100.0));
        assert_eq!(events[1].metadata, ActivityMetadata::default());
    }

    #[test]
    fn test_read_all_normalizes_stored_tags() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("activity_events.jsonl");
        fs::write(
            &path,
            r##"{"clanTag":"2pr8r8v8p","playerTag":"pq2","eventType":"war_attack","value":2,"occurredAt":"2025-06-02T14:00:00Z"}
{"clanTag":"#2PR8R8V8P","playerTag":"#ABC","eventType":"war_attack","value":2,"occurredAt":"2025-06-02T15:00:00Z"}
"##,
        )
        .unwrap();

        let reader: JsonlReader<ActivityEvent> = JsonlReader::new(path);
        let events = reader.read_all().unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].clan_tag, Tag::from("#2PR8R8V8P"));
        assert_eq!(events[0].player_tag, Tag::from("#PQ2"));
        assert_eq!(reader.scan().unwrap().invalid_lines, vec![2]);
    }

    #[test]
    fn test_scan_reports_invalid_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("wars.jsonl");
        JsonlWriter::new(path.clone())
            .write_all(&[war("w1", 15)])
            .unwrap();
        let mut text = fs::read_to_string(&path).unwrap();
        text.push_str("{\"id\": 7}\n\n{broken\n");
        fs::write(&path, text).unwrap();

        let report = JsonlReader::<War>::new(path).scan().unwrap();

        assert!(report.exists);
        assert_eq!(report.valid, 1);
        assert_eq!(report.invalid_lines, vec![2, 4]);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_scan_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let report = JsonlReader::<War>::new(temp_dir.path().join("wars.jsonl"))
            .scan()
            .unwrap();

        assert!(!report.exists);
        assert!(report.is_clean());
    }

    #[test]
    fn test_for_entity_paths() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig::new(temp_dir.path().to_path_buf());

        let reader: JsonlReader<War> = JsonlReader::for_entity(&config, EntityType::War);
        assert!(reader.path().ends_with("wars.jsonl"));
        assert_eq!(EntityType::Membership.filename(), "war_members.jsonl");
        assert_eq!(EntityType::Attack.filename(), "war_attacks.jsonl");
    }
}
