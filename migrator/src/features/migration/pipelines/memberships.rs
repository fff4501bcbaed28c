//! Membership import: invite each mapped user into the mapped space or room.
//!
//! A membership whose user or container never made it into the mapping is a
//! skip, not a failure. So is an invite for a user who already joined.

use tracing::{debug, error};

use super::stats::{MemberCounts, MembershipStats};
use crate::features::migration::mapping::Mapping;
use crate::features::migration::progress::{ProgressTracker, Stage};
use crate::services::client::{DestinationApi, Invitation};
use crate::services::source::{ChannelMember, Memberships, TeamMember};

pub async fn import_memberships(
    destination: &dyn DestinationApi,
    memberships: &Memberships,
    mapping: &Mapping,
    tracker: &mut ProgressTracker<'_>,
) -> MembershipStats {
    MembershipStats {
        team: apply_team_memberships(destination, &memberships.team_members, mapping, tracker)
            .await,
        channel: apply_channel_memberships(
            destination,
            &memberships.channel_members,
            mapping,
            tracker,
        )
        .await,
    }
}

async fn invite(
    destination: &dyn DestinationApi,
    container_id: &str,
    user_id: &str,
    counts: &mut MemberCounts,
) {
    match destination.invite_user(container_id, user_id).await {
        Ok(Invitation::Invited) => counts.added += 1,
        Ok(Invitation::AlreadyMember) => {
            debug!("[Members] {} already in {}", user_id, container_id);
            counts.skipped += 1;
        }
        Err(e) => {
            error!("[Members] Failed to invite {} to {}: {}", user_id, container_id, e);
            counts.failed += 1;
        }
    }
}

async fn apply_team_memberships(
    destination: &dyn DestinationApi,
    members: &[TeamMember],
    mapping: &Mapping,
    tracker: &mut ProgressTracker<'_>,
) -> MemberCounts {
    let mut counts = MemberCounts::default();
    let total = members.len();
    tracker.stage(Stage::TeamMemberships, total);

    for (idx, member) in members.iter().enumerate() {
        if member.is_deleted() {
            counts.skipped += 1;
        } else {
            match (
                mapping.matrix_user_id(&member.user_id),
                mapping.matrix_space_id(&member.team_id),
            ) {
                (Some(user_id), Some(space_id)) => {
                    invite(destination, space_id, user_id, &mut counts).await
                }
                (user_id, space_id) => {
                    if user_id.is_none() {
                        debug!("[Members] Team membership skipped: user {} not in mapping", member.user_id);
                    }
                    if space_id.is_none() {
                        debug!("[Members] Team membership skipped: team {} not in mapping", member.team_id);
                    }
                    counts.skipped += 1;
                }
            }
        }

        tracker
            .advance(Stage::TeamMemberships, idx + 1, total, None)
            .await;
    }

    counts
}

async fn apply_channel_memberships(
    destination: &dyn DestinationApi,
    members: &[ChannelMember],
    mapping: &Mapping,
    tracker: &mut ProgressTracker<'_>,
) -> MemberCounts {
    let mut counts = MemberCounts::default();
    let total = members.len();
    tracker.stage(Stage::ChannelMemberships, total);

    for (idx, member) in members.iter().enumerate() {
        if member.is_deleted() {
            counts.skipped += 1;
        } else {
            match (
                mapping.matrix_user_id(&member.user_id),
                mapping.matrix_room_id(&member.channel_id),
            ) {
                (Some(user_id), Some(room_id)) => {
                    invite(destination, room_id, user_id, &mut counts).await
                }
                (user_id, room_id) => {
                    if user_id.is_none() {
                        debug!("[Members] Channel membership skipped: user {} not in mapping", member.user_id);
                    }
                    if room_id.is_none() {
                        debug!(
                            "[Members] Channel membership skipped: channel {} not in mapping",
                            member.channel_id
                        );
                    }
                    counts.skipped += 1;
                }
            }
        }

        tracker
            .advance(Stage::ChannelMemberships, idx + 1, total, None)
            .await;
    }

    counts
}
