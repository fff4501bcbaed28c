//! Single-instance guard for a state file
//!
//! `<state_file>.lock` carries an exclusive advisory lock for as long as the
//! guard lives, and records the owner's pid for error messages. The kernel
//! drops the lock when the owning process exits, however it exits, so a file
//! left behind by a killed run never blocks the next one.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::services::errors::{MigrationError, MigrationResult, StorageError};

#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
    // Closing the handle releases the lock
    _file: File,
}

impl StateLock {
    pub fn lock_path(state_file: &Path) -> PathBuf {
        let mut path = state_file.as_os_str().to_owned();
        path.push(".lock");
        PathBuf::from(path)
    }

    pub fn acquire(state_file: &Path) -> MigrationResult<Self> {
        let path = Self::lock_path(state_file);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        // Not truncated on open: the current holder's pid stays readable
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StorageError::io(&path, e))?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() != fs2::lock_contended_error().kind() {
                return Err(StorageError::io(&path, e).into());
            }
            let owner = std::fs::read_to_string(&path)
                .ok()
                .map(|pid| pid.trim().to_string())
                .filter(|pid| !pid.is_empty())
                .map(|pid| format!("pid {}", pid))
                .unwrap_or_else(|| "unknown owner".to_string());
            return Err(MigrationError::StateLocked { path, owner });
        }

        record_owner(&mut file).map_err(|e| StorageError::io(&path, e))?;
        debug!("[Lock] Acquired {}", path.display());
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn record_owner(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{}", std::process::id())?;
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_holder_is_rejected_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = dir.path().join("state.json");

        let first = StateLock::acquire(&state_file).unwrap();
        assert_eq!(first.path(), dir.path().join("state.json.lock"));
        let contents = std::fs::read_to_string(first.path()).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());

        match StateLock::acquire(&state_file) {
            Err(MigrationError::StateLocked { path, owner }) => {
                assert_eq!(path, dir.path().join("state.json.lock"));
                assert!(owner.contains(&std::process::id().to_string()));
            }
            other => panic!("expected StateLocked, got {:?}", other),
        }

        drop(first);
        let _again = StateLock::acquire(&state_file).unwrap();
    }

    #[test]
    fn test_file_left_by_dead_process_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = dir.path().join("state.json");
        // What a killed run leaves behind: the file, but no kernel lock
        std::fs::write(StateLock::lock_path(&state_file), "4194304\n").unwrap();

        let lock = StateLock::acquire(&state_file).unwrap();

        let contents = std::fs::read_to_string(lock.path()).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
    }
}
