//! Export pipelines: read everything from the source, drop soft-deleted
//! records and write one compressed, timestamped artifact.

use std::path::Path;

use chrono::Utc;
use tracing::info;

use super::stats::{
    AssetExport, AssetExportSummary, FilterCounts, MembershipExport, MembershipExportSummary,
};
use crate::features::migration::progress::{ProgressTracker, Stage};
use crate::services::archive::{artifact_path, save_compressed};
use crate::services::errors::{MigrationError, MigrationResult};
use crate::services::source::{Assets, Memberships, SourceProvider, ARTIFACT_VERSION};

pub const ASSETS_ARTIFACT_PREFIX: &str = "mattermost-assets";
pub const MEMBERSHIPS_ARTIFACT_PREFIX: &str = "mattermost-memberships";

fn keep_active<T>(records: Vec<T>, is_deleted: impl Fn(&T) -> bool) -> (Vec<T>, FilterCounts) {
    let total = records.len();
    let active: Vec<T> = records.into_iter().filter(|r| !is_deleted(r)).collect();
    let counts = FilterCounts {
        exported: active.len(),
        deleted: total - active.len(),
    };
    (active, counts)
}

pub fn filter_active_assets(assets: Assets) -> (Assets, AssetExportSummary) {
    let (users, users_counts) = keep_active(assets.users, |u| u.is_deleted());
    let (teams, teams_counts) = keep_active(assets.teams, |t| t.is_deleted());
    let (channels, channels_counts) = keep_active(assets.channels, |c| c.is_deleted());

    (
        Assets {
            exported_at: assets.exported_at,
            version: assets.version,
            users,
            teams,
            channels,
        },
        AssetExportSummary {
            users: users_counts,
            teams: teams_counts,
            channels: channels_counts,
        },
    )
}

pub fn filter_active_memberships(memberships: Memberships) -> (Memberships, MembershipExportSummary) {
    let (team_members, team_counts) = keep_active(memberships.team_members, |m| m.is_deleted());
    let (channel_members, channel_counts) =
        keep_active(memberships.channel_members, |m| m.is_deleted());

    (
        Memberships {
            exported_at: memberships.exported_at,
            version: memberships.version,
            team_members,
            channel_members,
        },
        MembershipExportSummary {
            team_members: team_counts,
            channel_members: channel_counts,
        },
    )
}

pub async fn export_assets(
    source: &dyn SourceProvider,
    assets_dir: &Path,
    tracker: &mut ProgressTracker<'_>,
) -> MigrationResult<AssetExport> {
    let exported_at = Utc::now();

    tracker.stage(Stage::Users, 0);
    let users = source.list_users().await?;
    tracker.advance(Stage::Users, users.len(), users.len(), None).await;

    tracker.stage(Stage::Teams, 0);
    let teams = source.list_teams().await?;
    tracker.advance(Stage::Teams, teams.len(), teams.len(), None).await;

    tracker.stage(Stage::Channels, 0);
    let channels = source.list_channels().await?;
    tracker
        .advance(Stage::Channels, channels.len(), channels.len(), None)
        .await;

    let (assets, summary) = filter_active_assets(Assets {
        exported_at: exported_at.timestamp_millis(),
        version: ARTIFACT_VERSION.to_string(),
        users,
        teams,
        channels,
    });
    info!(
        "[Export] Assets: {} users ({} deleted), {} teams ({} deleted), {} channels ({} deleted)",
        summary.users.exported,
        summary.users.deleted,
        summary.teams.exported,
        summary.teams.deleted,
        summary.channels.exported,
        summary.channels.deleted
    );

    let output_file = artifact_path(assets_dir, ASSETS_ARTIFACT_PREFIX, exported_at);
    save_compressed(&output_file, &assets)
        .await
        .map_err(|e| MigrationError::from(e).with_context("saving asset export"))?;

    Ok(AssetExport {
        stats: assets.calculate_stats(),
        output_file,
        summary,
    })
}

pub async fn export_memberships(
    source: &dyn SourceProvider,
    assets_dir: &Path,
    tracker: &mut ProgressTracker<'_>,
) -> MigrationResult<MembershipExport> {
    let exported_at = Utc::now();

    tracker.stage(Stage::TeamMembers, 0);
    let team_members = source.list_team_members().await?;
    tracker
        .advance(Stage::TeamMembers, team_members.len(), team_members.len(), None)
        .await;

    tracker.stage(Stage::ChannelMembers, 0);
    let channel_members = source.list_channel_members().await?;
    tracker
        .advance(
            Stage::ChannelMembers,
            channel_members.len(),
            channel_members.len(),
            None,
        )
        .await;

    let (memberships, summary) = filter_active_memberships(Memberships {
        exported_at: exported_at.timestamp_millis(),
        version: ARTIFACT_VERSION.to_string(),
        team_members,
        channel_members,
    });
    info!(
        "[Export] Memberships: {} team members ({} deleted), {} channel members",
        summary.team_members.exported,
        summary.team_members.deleted,
        summary.channel_members.exported
    );

    let output_file = artifact_path(assets_dir, MEMBERSHIPS_ARTIFACT_PREFIX, exported_at);
    save_compressed(&output_file, &memberships)
        .await
        .map_err(|e| MigrationError::from(e).with_context("saving membership export"))?;

    Ok(MembershipExport {
        output_file,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::source::{TeamMember, User};

    fn user(id: &str, delete_at: i64) -> User {
        User {
            id: id.to_string(),
            username: id.to_string(),
            delete_at,
            ..User::default()
        }
    }

    #[test]
    fn test_filter_keeps_only_active_records() {
        let assets = Assets {
            exported_at: 1,
            version: ARTIFACT_VERSION.to_string(),
            users: vec![user("a", 0), user("b", 1_700_000_000_000), user("c", 0)],
            teams: Vec::new(),
            channels: Vec::new(),
        };

        let (filtered, summary) = filter_active_assets(assets);
        let ids: Vec<&str> = filtered.users.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(summary.users, FilterCounts { exported: 2, deleted: 1 });
        assert_eq!(summary.users.total(), 3);
        assert_eq!(filtered.exported_at, 1);
    }

    #[test]
    fn test_filter_drops_deleted_team_memberships() {
        let member = |team: &str, delete_at| TeamMember {
            team_id: team.to_string(),
            user_id: "u1".to_string(),
            roles: String::new(),
            delete_at,
        };
        let memberships = Memberships {
            exported_at: 1,
            version: ARTIFACT_VERSION.to_string(),
            team_members: vec![member("t1", 0), member("t2", 42)],
            channel_members: Vec::new(),
        };

        let (filtered, summary) = filter_active_memberships(memberships);
        assert_eq!(filtered.team_members.len(), 1);
        assert_eq!(summary.team_members.deleted, 1);
        assert_eq!(summary.channel_members, FilterCounts::default());
    }
}
