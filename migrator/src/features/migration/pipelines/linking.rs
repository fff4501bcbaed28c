//! Room → space hierarchy.
//!
//! Each pair gets an `m.space.child` event in the space and an
//! `m.space.parent` event in the room. The parent pointer is a convenience:
//! when only that call fails, the pair still counts as linked.

use tracing::{error, info, warn};

use super::stats::{FreshEntities, LinkStats};
use crate::features::migration::mapping::Mapping;
use crate::features::migration::progress::{ProgressTracker, Stage};
use crate::services::client::DestinationApi;
use crate::services::source::Channel;

/// Links every team channel whose room and space are both mapped and at least
/// one of them entered the mapping in this run. Pairs settled by an earlier
/// run are left alone.
pub async fn link_rooms_to_spaces(
    destination: &dyn DestinationApi,
    channels: &[Channel],
    mapping: &Mapping,
    fresh: &FreshEntities,
    tracker: &mut ProgressTracker<'_>,
) -> LinkStats {
    let mut stats = LinkStats::default();
    let total = channels.len();
    tracker.stage(Stage::Linking, total);

    for (idx, channel) in channels.iter().enumerate() {
        if let Some((space_id, room_id)) = linkable(channel, mapping, fresh) {
            match destination.add_room_to_space(space_id, room_id).await {
                Ok(()) => {
                    if let Err(e) = destination.set_room_parent(room_id, space_id).await {
                        warn!(
                            "[Link] Failed to set parent for room '{}': {}",
                            channel.display_name, e
                        );
                        stats.parent_failed += 1;
                    }
                    info!("[Link] Linked room '{}' to its space", channel.display_name);
                    stats.linked += 1;
                }
                Err(e) => {
                    error!(
                        "[Link] Failed to link room '{}' ({}) to space {}: {}",
                        channel.display_name, room_id, space_id, e
                    );
                    stats.link_failed += 1;
                }
            }
        }

        tracker
            .advance(Stage::Linking, idx + 1, total, Some(&channel.display_name))
            .await;
    }

    stats
}

fn linkable<'m>(
    channel: &Channel,
    mapping: &'m Mapping,
    fresh: &FreshEntities,
) -> Option<(&'m str, &'m str)> {
    if channel.team_id.is_empty() {
        return None;
    }
    let space_id = mapping.matrix_space_id(&channel.team_id)?;
    let room_id = mapping.matrix_room_id(&channel.id)?;

    let is_new = fresh.channels.contains(&channel.id) || fresh.teams.contains(&channel.team_id);
    is_new.then_some((space_id, room_id))
}
