//! Per-run statistics returned by the pipelines. Not persisted.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::services::source::ExportStats;

/// Active records written to an artifact vs soft-deleted records dropped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterCounts {
    pub exported: usize,
    pub deleted: usize,
}

impl FilterCounts {
    pub fn total(&self) -> usize {
        self.exported + self.deleted
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssetExportSummary {
    pub users: FilterCounts,
    pub teams: FilterCounts,
    pub channels: FilterCounts,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MembershipExportSummary {
    pub team_members: FilterCounts,
    pub channel_members: FilterCounts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetExport {
    pub output_file: PathBuf,
    pub summary: AssetExportSummary,
    pub stats: ExportStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipExport {
    pub output_file: PathBuf,
    pub summary: MembershipExportSummary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl fmt::Display for EntityCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created={}, skipped={}, failed={}",
            self.created, self.skipped, self.failed
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub linked: usize,
    pub link_failed: usize,
    /// Child link succeeded but the parent pointer could not be set
    pub parent_failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub users: EntityCounts,
    pub spaces: EntityCounts,
    pub rooms: EntityCounts,
    pub links: LinkStats,
}

/// Source ids whose destination id entered the mapping during this run,
/// either created or discovered as already existing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreshEntities {
    pub users: HashSet<String>,
    pub teams: HashSet<String>,
    pub channels: HashSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetImport {
    pub stats: ImportStats,
    pub fresh: FreshEntities,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemberCounts {
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MembershipStats {
    pub team: MemberCounts,
    pub channel: MemberCounts,
}

impl MembershipStats {
    pub fn members_added(&self) -> usize {
        self.team.added + self.channel.added
    }

    pub fn members_skipped(&self) -> usize {
        self.team.skipped + self.channel.skipped
    }

    pub fn members_failed(&self) -> usize {
        self.team.failed + self.channel.failed
    }
}
