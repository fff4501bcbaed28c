//! On-disk documents: zstd-compressed export artifacts and the plain JSON
//! files (state, mapping) that are rewritten in place.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::services::errors::StorageError;

pub const ARTIFACT_EXTENSION: &str = "json.zst";

const ZSTD_COMPRESSION_LEVEL: i32 = 3;

/// `<dir>/<prefix>-YYYYmmdd-HHMMSS.json.zst`
pub fn artifact_path(dir: &Path, prefix: &str, at: DateTime<Utc>) -> PathBuf {
    dir.join(format!(
        "{}-{}.{}",
        prefix,
        at.format("%Y%m%d-%H%M%S"),
        ARTIFACT_EXTENSION
    ))
}

pub async fn save_compressed<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_vec(value).map_err(|source| StorageError::Serialize {
        what: path.display().to_string(),
        source,
    })?;
    let compressed = zstd::bulk::compress(&json, ZSTD_COMPRESSION_LEVEL).map_err(|source| {
        StorageError::Compression {
            path: path.to_path_buf(),
            source,
        }
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io(parent, e))?;
    }
    tokio::fs::write(path, compressed)
        .await
        .map_err(|e| StorageError::io(path, e))
}

pub async fn load_compressed<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let compressed = read_file(path).await?;

    let json = zstd::decode_all(Cursor::new(compressed)).map_err(|source| {
        StorageError::Compression {
            path: path.to_path_buf(),
            source,
        }
    })?;

    serde_json::from_slice(&json).map_err(|e| StorageError::parse(path, e))
}

/// Pretty JSON written to a sibling temp file and renamed over `path`, so a
/// reader never observes a half-written document.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Serialize {
        what: path.display().to_string(),
        source,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io(parent, e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| StorageError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StorageError::io(path, e))
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let data = read_file(path).await?;
    serde_json::from_slice(&data).map_err(|e| StorageError::parse(path, e))
}

async fn read_file(path: &Path) -> Result<Vec<u8>, StorageError> {
    tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            StorageError::io(path, e)
        }
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::services::source::{Memberships, TeamMember, ARTIFACT_VERSION};

    #[test]
    fn test_artifact_path_is_timestamped() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let path = artifact_path(Path::new("/data/assets"), "mattermost-assets", at);
        assert_eq!(
            path,
            PathBuf::from("/data/assets/mattermost-assets-20240309-140507.json.zst")
        );
    }

    #[tokio::test]
    async fn test_compressed_artifact_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memberships.json.zst");
        let memberships = Memberships {
            exported_at: 1_700_000_000_000,
            version: ARTIFACT_VERSION.to_string(),
            team_members: vec![TeamMember {
                team_id: "t1".to_string(),
                user_id: "u1".to_string(),
                roles: "team_user".to_string(),
                delete_at: 0,
            }],
            channel_members: Vec::new(),
        };

        save_compressed(&path, &memberships).await.unwrap();
        let raw = std::fs::read(&path).unwrap();
        assert_ne!(raw.first(), Some(&b'{'));

        let loaded: Memberships = load_compressed(&path).await.unwrap();
        assert_eq!(loaded, memberships);
    }

    #[tokio::test]
    async fn test_atomic_write_replaces_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_json_atomic(&path, &serde_json::json!({"generation": 1}))
            .await
            .unwrap();
        write_json_atomic(&path, &serde_json::json!({"generation": 2}))
            .await
            .unwrap();

        let value: serde_json::Value = read_json(&path).await.unwrap();
        assert_eq!(value["generation"], 2);
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_and_corrupt_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json.zst");
        assert!(matches!(
            load_compressed::<Memberships>(&missing).await,
            Err(StorageError::NotFound { .. })
        ));

        let corrupt = dir.path().join("corrupt.json.zst");
        std::fs::write(&corrupt, b"not zstd at all").unwrap();
        assert!(matches!(
            load_compressed::<Memberships>(&corrupt).await,
            Err(StorageError::Compression { .. })
        ));
    }
}
