//! Mattermost → Matrix identifier mapping
//!
//! A mapping document records, per entity kind, which destination id a source
//! id was migrated to. A present entry means "already handled": merges never
//! replace an existing value, they report the conflict instead.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::state::now_millis;
use crate::services::archive::{read_json, write_json_atomic};
use crate::services::errors::StorageError;

pub const MAPPING_VERSION: &str = "1.0";
pub const MAPPING_FILE_PREFIX: &str = "asset-mapping-";
const MAPPING_FILE_SUFFIX: &str = ".json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub version: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub homeserver: String,
    /// Mattermost user id → Matrix user id
    #[serde(default)]
    pub users: BTreeMap<String, String>,
    /// Mattermost team id → Matrix space id
    #[serde(default)]
    pub teams: BTreeMap<String, String>,
    /// Mattermost channel id → Matrix room id
    #[serde(default)]
    pub channels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub source_id: String,
    pub kept: String,
    pub rejected: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub added: usize,
    pub conflicts: Vec<MergeConflict>,
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MappingStats {
    pub users_count: usize,
    pub teams_count: usize,
    pub channels_count: usize,
}

impl Mapping {
    pub fn new(homeserver: &str) -> Self {
        let now = now_millis();
        Self {
            version: MAPPING_VERSION.to_string(),
            created_at: now,
            updated_at: now,
            homeserver: homeserver.to_string(),
            users: BTreeMap::new(),
            teams: BTreeMap::new(),
            channels: BTreeMap::new(),
        }
    }

    pub fn merge_users<I>(&mut self, entries: I) -> MergeOutcome
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let outcome = merge_into(&mut self.users, entries, "user");
        self.touch();
        outcome
    }

    pub fn merge_teams<I>(&mut self, entries: I) -> MergeOutcome
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let outcome = merge_into(&mut self.teams, entries, "team");
        self.touch();
        outcome
    }

    pub fn merge_channels<I>(&mut self, entries: I) -> MergeOutcome
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let outcome = merge_into(&mut self.channels, entries, "channel");
        self.touch();
        outcome
    }

    pub fn matrix_user_id(&self, mattermost_user_id: &str) -> Option<&str> {
        self.users.get(mattermost_user_id).map(String::as_str)
    }

    pub fn matrix_space_id(&self, mattermost_team_id: &str) -> Option<&str> {
        self.teams.get(mattermost_team_id).map(String::as_str)
    }

    pub fn matrix_room_id(&self, mattermost_channel_id: &str) -> Option<&str> {
        self.channels.get(mattermost_channel_id).map(String::as_str)
    }

    pub fn stats(&self) -> MappingStats {
        MappingStats {
            users_count: self.users.len(),
            teams_count: self.teams.len(),
            channels_count: self.channels.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.teams.is_empty() && self.channels.is_empty()
    }

    /// `<dir>/asset-mapping-YYYYmmdd-HHMMSS.json`
    pub fn generate_filename(dir: &Path) -> PathBuf {
        dir.join(format!(
            "{}{}{}",
            MAPPING_FILE_PREFIX,
            chrono::Utc::now().format("%Y%m%d-%H%M%S"),
            MAPPING_FILE_SUFFIX
        ))
    }

    pub async fn save(&self, path: &Path) -> Result<(), StorageError> {
        write_json_atomic(path, self).await
    }

    /// Unlike the state store, a missing mapping file is an error here.
    pub async fn load(path: &Path) -> Result<Self, StorageError> {
        read_json(path).await
    }

    fn touch(&mut self) {
        self.updated_at = now_millis();
    }
}

fn merge_into<I>(target: &mut BTreeMap<String, String>, entries: I, kind: &str) -> MergeOutcome
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut outcome = MergeOutcome::default();
    for (source_id, destination_id) in entries {
        match target.get(&source_id) {
            Some(existing) if *existing == destination_id => {}
            Some(existing) => {
                warn!(
                    "[Mapping] Keeping existing {} mapping {} -> {}, ignoring {}",
                    kind, source_id, existing, destination_id
                );
                outcome.conflicts.push(MergeConflict {
                    kept: existing.clone(),
                    source_id,
                    rejected: destination_id,
                });
            }
            None => {
                target.insert(source_id, destination_id);
                outcome.added += 1;
            }
        }
    }
    outcome
}

/// Most recently modified `asset-mapping-*.json` in `dir`, if any.
/// A missing directory counts as "no mapping yet".
pub async fn latest_mapping_file(dir: &Path) -> Result<Option<PathBuf>, StorageError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::io(dir, e)),
    };

    let mut latest: Option<(SystemTime, PathBuf)> = None;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageError::io(dir, e))?
    {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(MAPPING_FILE_PREFIX) || !name.ends_with(MAPPING_FILE_SUFFIX) {
            continue;
        }

        // Files that vanish or cannot be inspected are ignored
        let modified = match entry.metadata().await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => continue,
        };

        let newer = latest
            .as_ref()
            .map_or(true, |(latest_time, _)| modified > *latest_time);
        if newer {
            latest = Some((modified, entry.path()));
        }
    }

    Ok(latest.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn pair(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    #[test]
    fn test_merge_adds_new_entries() {
        let mut mapping = Mapping::new("example.org");
        let outcome = mapping.merge_users(vec![
            pair("u1", "@alice:example.org"),
            pair("u2", "@bob:example.org"),
        ]);

        assert_eq!(outcome.added, 2);
        assert!(outcome.is_clean());
        assert_eq!(mapping.matrix_user_id("u1"), Some("@alice:example.org"));
        assert_eq!(mapping.stats().users_count, 2);
    }

    #[test]
    fn test_merge_never_overwrites_existing_value() {
        let mut mapping = Mapping::new("example.org");
        mapping.merge_channels(vec![pair("c1", "!first:example.org")]);

        let outcome = mapping.merge_channels(vec![
            pair("c1", "!second:example.org"),
            pair("c2", "!other:example.org"),
        ]);

        assert_eq!(outcome.added, 1);
        assert_eq!(
            outcome.conflicts,
            vec![MergeConflict {
                source_id: "c1".to_string(),
                kept: "!first:example.org".to_string(),
                rejected: "!second:example.org".to_string(),
            }]
        );
        assert_eq!(mapping.matrix_room_id("c1"), Some("!first:example.org"));
    }

    #[test]
    fn test_remerging_same_value_is_not_a_conflict() {
        let mut mapping = Mapping::new("example.org");
        mapping.merge_teams(vec![pair("t1", "!space:example.org")]);
        let outcome = mapping.merge_teams(vec![pair("t1", "!space:example.org")]);

        assert_eq!(outcome, MergeOutcome::default());
        assert_eq!(mapping.matrix_space_id("t1"), Some("!space:example.org"));
    }

    #[test]
    fn test_generated_filename_matches_discovery_pattern() {
        let path = Mapping::generate_filename(Path::new("/data/mappings"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("asset-mapping-"));
        assert!(name.ends_with(".json"));
        // asset-mapping-YYYYmmdd-HHMMSS.json
        assert_eq!(name.len(), "asset-mapping-".len() + 15 + ".json".len());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("asset-mapping-20240101-000000.json");

        let mut mapping = Mapping::new("example.org");
        mapping.merge_users(vec![pair("u1", "@alice:example.org")]);
        mapping.save(&path).await.unwrap();

        let loaded = Mapping::load(&path).await.unwrap();
        assert_eq!(loaded, mapping);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Mapping::load(&dir.path().join("asset-mapping-none.json")).await;
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_latest_mapping_file_picks_newest() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(latest_mapping_file(dir.path()).await.unwrap(), None);
        assert_eq!(
            latest_mapping_file(&dir.path().join("absent")).await.unwrap(),
            None
        );

        let older = dir.path().join("asset-mapping-20240101-000000.json");
        let newer = dir.path().join("asset-mapping-20240102-000000.json");
        std::fs::write(&older, "{}").unwrap();
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();
        std::fs::write(dir.path().join("asset-mapping-20240103-000000.json.bak"), "{}").unwrap();
        // mtime resolution on some filesystems is coarse
        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::write(&newer, "{}").unwrap();

        let base = SystemTime::now();
        std::fs::File::options()
            .write(true)
            .open(&older)
            .unwrap()
            .set_modified(base - Duration::from_secs(3600))
            .unwrap();

        assert_eq!(latest_mapping_file(dir.path()).await.unwrap(), Some(newer));
    }
}
