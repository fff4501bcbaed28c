//! Finding where a previous run left off
//!
//! The import pipelines dedupe against the newest mapping generation. It is
//! located through the state file first and the mappings directory second.
//! Once a mapping file is found it must load: silently starting fresh would
//! recreate everything it lists.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::mapping::{latest_mapping_file, Mapping};
use super::state::{MigrationState, StepName};
use crate::services::errors::{MigrationError, MigrationResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingSource {
    /// The output recorded for import_assets in the state file
    Recorded(PathBuf),
    /// Newest `asset-mapping-*.json` in the mappings directory
    Discovered(PathBuf),
    Fresh,
}

impl fmt::Display for MappingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingSource::Recorded(path) => write!(f, "recorded mapping {}", path.display()),
            MappingSource::Discovered(path) => write!(f, "latest mapping {}", path.display()),
            MappingSource::Fresh => f.write_str("empty mapping"),
        }
    }
}

async fn load_required(path: &Path) -> MigrationResult<Mapping> {
    Mapping::load(path).await.map_err(|e| MigrationError::Resume {
        reason: format!("existing mapping could not be loaded: {}", e),
    })
}

/// Mapping to dedupe an asset import against
pub async fn existing_mapping(
    state: &MigrationState,
    mappings_dir: &Path,
    homeserver: &str,
) -> MigrationResult<(Mapping, MappingSource)> {
    if let Some(recorded) = state.output_file(StepName::ImportAssets) {
        if recorded.exists() {
            let mapping = load_required(recorded).await?;
            info!("[Resume] Using recorded mapping {}", recorded.display());
            return Ok((mapping, MappingSource::Recorded(recorded.to_path_buf())));
        }
        warn!(
            "[Resume] Recorded mapping {} is missing, looking in {}",
            recorded.display(),
            mappings_dir.display()
        );
    }

    let latest = latest_mapping_file(mappings_dir)
        .await
        .map_err(|e| MigrationError::from(e).with_context("scanning mappings directory"))?;
    if let Some(latest) = latest {
        let mapping = load_required(&latest).await?;
        info!("[Resume] Using latest mapping {}", latest.display());
        return Ok((mapping, MappingSource::Discovered(latest)));
    }

    info!("[Resume] No previous mapping, starting fresh");
    Ok((Mapping::new(homeserver), MappingSource::Fresh))
}

/// Mapping written by the completed import_assets step. Membership import
/// cannot run without it.
pub async fn recorded_mapping(state: &MigrationState) -> MigrationResult<(Mapping, PathBuf)> {
    let path = state
        .output_file(StepName::ImportAssets)
        .ok_or_else(|| MigrationError::Resume {
            reason: "no mapping file recorded by import_assets".to_string(),
        })?;
    let mapping = load_required(path).await?;
    Ok((mapping, path.to_path_buf()))
}

/// First step, in declaration order, that is neither completed nor skipped
/// and whose prerequisites are met
pub fn next_step(state: &MigrationState) -> Option<StepName> {
    StepName::ALL
        .into_iter()
        .find(|step| !state.status(*step).is_terminal() && state.can_run_step(*step).0)
}
