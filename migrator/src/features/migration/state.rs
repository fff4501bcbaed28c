//! Migration state machine
//!
//! One persisted record per named step. The dependency table below is the
//! single source of run-order: a step may enter `in_progress` only when every
//! prerequisite is `completed`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::services::archive::{read_json, write_json_atomic};
use crate::services::errors::{MigrationError, MigrationResult, StorageError};

pub const STATE_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    ExportAssets,
    ImportAssets,
    ExportMemberships,
    ImportMemberships,
    ExportMessages,
    ImportMessages,
}

/// Step key and the steps that must be completed before it may start
static STEP_TABLE: [(StepName, &str, &[StepName]); 6] = [
    (StepName::ExportAssets, "export_assets", &[]),
    (
        StepName::ImportAssets,
        "import_assets",
        &[StepName::ExportAssets],
    ),
    (
        StepName::ExportMemberships,
        "export_memberships",
        &[StepName::ImportAssets],
    ),
    (
        StepName::ImportMemberships,
        "import_memberships",
        &[StepName::ExportMemberships],
    ),
    (
        StepName::ExportMessages,
        "export_messages",
        &[StepName::ExportAssets],
    ),
    (
        StepName::ImportMessages,
        "import_messages",
        &[StepName::ExportMessages, StepName::ImportAssets],
    ),
];

impl StepName {
    pub const ALL: [StepName; 6] = [
        StepName::ExportAssets,
        StepName::ImportAssets,
        StepName::ExportMemberships,
        StepName::ImportMemberships,
        StepName::ExportMessages,
        StepName::ImportMessages,
    ];

    fn entry(self) -> &'static (StepName, &'static str, &'static [StepName]) {
        // The table is indexed by declaration order
        &STEP_TABLE[self as usize]
    }

    pub fn as_str(self) -> &'static str {
        self.entry().1
    }

    pub fn prerequisites(self) -> &'static [StepName] {
        self.entry().2
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepName {
    type Err = String;

    /// Accepts `import_assets` as well as `import-assets`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().replace('-', "_");
        STEP_TABLE
            .iter()
            .find(|(_, name, _)| *name == key)
            .map(|(step, _, _)| *step)
            .ok_or_else(|| "unknown step".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Skipped)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepState {
    pub name: StepName,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(default)]
    pub items_processed: u64,
    #[serde(default)]
    pub items_total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,
}

impl StepState {
    pub fn pending(name: StepName) -> Self {
        Self {
            name,
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            items_processed: 0,
            items_total: 0,
            error_message: None,
            output_file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateSummary {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationState {
    pub version: String,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mattermost_host: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub matrix_host: String,
    #[serde(default)]
    pub steps: BTreeMap<StepName, StepState>,
}

impl Default for MigrationState {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationState {
    pub fn new() -> Self {
        let now = now_millis();
        Self {
            version: STATE_VERSION.to_string(),
            created_at: now,
            updated_at: now,
            mattermost_host: String::new(),
            matrix_host: String::new(),
            steps: BTreeMap::new(),
        }
    }

    /// Existing entry, or a fresh `pending` one
    pub fn get_step(&mut self, name: StepName) -> &mut StepState {
        self.steps
            .entry(name)
            .or_insert_with(|| StepState::pending(name))
    }

    pub fn step(&self, name: StepName) -> Option<&StepState> {
        self.steps.get(&name)
    }

    pub fn status(&self, name: StepName) -> StepStatus {
        self.step(name)
            .map(|step| step.status)
            .unwrap_or(StepStatus::Pending)
    }

    pub fn output_file(&self, name: StepName) -> Option<&Path> {
        self.step(name).and_then(|step| step.output_file.as_deref())
    }

    /// `(allowed, reason)`; the reason names the first unmet prerequisite
    pub fn can_run_step(&self, name: StepName) -> (bool, String) {
        match name
            .prerequisites()
            .iter()
            .find(|prerequisite| self.status(**prerequisite) != StepStatus::Completed)
        {
            Some(missing) => (false, format!("{} must be completed first", missing)),
            None => (true, String::new()),
        }
    }

    /// Same as [`can_run_step`](Self::can_run_step) for a step given by key
    pub fn can_run_step_named(&self, name: &str) -> (bool, String) {
        match name.parse::<StepName>() {
            Ok(step) => self.can_run_step(step),
            Err(reason) => (false, reason),
        }
    }

    pub fn ensure_can_run(&self, name: StepName) -> MigrationResult<()> {
        let (allowed, reason) = self.can_run_step(name);
        if allowed {
            Ok(())
        } else {
            Err(MigrationError::PrerequisiteNotMet {
                step: name.to_string(),
                reason,
            })
        }
    }

    pub fn start_step(&mut self, name: StepName) {
        let now = now_millis();
        let step = self.get_step(name);
        step.status = StepStatus::InProgress;
        step.started_at = Some(now);
        step.completed_at = None;
        step.items_processed = 0;
        step.items_total = 0;
        step.error_message = None;
        self.updated_at = now;
    }

    pub fn update_step_progress(&mut self, name: StepName, processed: u64, total: u64) {
        let step = self.get_step(name);
        step.items_processed = processed;
        step.items_total = total;
        self.updated_at = now_millis();
    }

    pub fn complete_step(&mut self, name: StepName, output_file: Option<PathBuf>) {
        let now = now_millis();
        let step = self.get_step(name);
        step.status = StepStatus::Completed;
        step.completed_at = Some(now);
        step.output_file = output_file;
        self.updated_at = now;
    }

    /// Failure ends this run only; the step can be started again later.
    pub fn fail_step(&mut self, name: StepName, error: &str) {
        let now = now_millis();
        let step = self.get_step(name);
        step.status = StepStatus::Failed;
        step.completed_at = Some(now);
        step.error_message = Some(error.to_string());
        self.updated_at = now;
    }

    pub fn skip_step(&mut self, name: StepName, reason: &str) {
        let now = now_millis();
        let step = self.get_step(name);
        step.status = StepStatus::Skipped;
        step.completed_at = Some(now);
        step.error_message = Some(reason.to_string());
        self.updated_at = now;
    }

    pub fn is_complete(&self) -> bool {
        StepName::ALL
            .iter()
            .all(|step| self.status(*step).is_terminal())
    }

    /// Counts over all six steps; steps never touched count as pending
    pub fn summary(&self) -> StateSummary {
        let mut summary = StateSummary::default();
        for step in StepName::ALL {
            match self.status(step) {
                StepStatus::Pending => summary.pending += 1,
                StepStatus::InProgress => summary.in_progress += 1,
                StepStatus::Completed => summary.completed += 1,
                StepStatus::Failed => summary.failed += 1,
                StepStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }
}

/// Reads and rewrites the whole state document at a fixed path
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// A missing file yields a fresh state; a corrupt one is an error.
    pub async fn load(&self) -> Result<MigrationState, StorageError> {
        match read_json::<MigrationState>(&self.path).await {
            Ok(state) => Ok(state),
            Err(StorageError::NotFound { .. }) => {
                debug!("[State] No state file at {}, starting fresh", self.path.display());
                Ok(MigrationState::new())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn save(&self, state: &MigrationState) -> Result<(), StorageError> {
        write_json_atomic(&self.path, state).await
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
