//! Asset import: users, then teams as spaces, then channels as rooms.
//!
//! Records already present in the mapping are skipped before any destination
//! call is made. Every per-record failure is counted and the batch moves on.

use std::collections::HashMap;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, error, info, warn};

use super::stats::{AssetImport, EntityCounts, FreshEntities};
use crate::features::migration::mapping::Mapping;
use crate::features::migration::progress::{ProgressTracker, Stage};
use crate::services::client::{DestinationApi, Provisioned, RoomSpec};
use crate::services::source::{Assets, Channel, ChannelKind, Team, User};

const PASSWORD_LENGTH: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    /// Give spaces and rooms a canonical alias so a repeated create resolves
    /// to the room made earlier
    pub room_aliases: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self { room_aliases: true }
    }
}

/// Initial password for a created account. Users reset it on first login.
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// Lowercases and replaces anything outside `[a-z0-9._=-]` with `-`
pub fn sanitize_alias(raw: &str) -> Option<String> {
    let alias: String = raw
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' | '_' | '=' | '-' => c,
            _ => '-',
        })
        .collect();
    let alias = alias.trim_matches('-');
    (!alias.is_empty()).then(|| alias.to_string())
}

pub fn space_alias(team: &Team) -> Option<String> {
    sanitize_alias(&team.name)
}

pub fn room_alias(team_name: Option<&str>, channel: &Channel) -> Option<String> {
    match team_name.filter(|name| !name.is_empty()) {
        Some(team) => sanitize_alias(&format!("{}-{}", team, channel.name)),
        None => sanitize_alias(&channel.name),
    }
}

/// Runs the three creation stages in order, merging every resolved id into
/// `mapping` as it goes. Linking is a separate pass.
pub async fn import_assets(
    destination: &dyn DestinationApi,
    assets: &Assets,
    mapping: &mut Mapping,
    options: ImportOptions,
    tracker: &mut ProgressTracker<'_>,
) -> AssetImport {
    info!(
        "[Import] Importing {} users, {} teams, {} channels ({} users, {} spaces, {} rooms already mapped)",
        assets.users.len(),
        assets.teams.len(),
        assets.channels.len(),
        mapping.users.len(),
        mapping.teams.len(),
        mapping.channels.len()
    );

    let mut result = AssetImport::default();

    result.stats.users = import_users(
        destination,
        &assets.users,
        mapping,
        &mut result.fresh,
        tracker,
    )
    .await;
    info!("[Import] Users: {}", result.stats.users);

    result.stats.spaces = import_teams_as_spaces(
        destination,
        &assets.teams,
        mapping,
        &mut result.fresh,
        options,
        tracker,
    )
    .await;
    info!("[Import] Spaces: {}", result.stats.spaces);

    let team_names: HashMap<&str, &str> = assets
        .teams
        .iter()
        .map(|team| (team.id.as_str(), team.name.as_str()))
        .collect();
    result.stats.rooms = import_channels_as_rooms(
        destination,
        &assets.channels,
        &team_names,
        mapping,
        &mut result.fresh,
        options,
        tracker,
    )
    .await;
    info!("[Import] Rooms: {}", result.stats.rooms);

    result
}

async fn import_users(
    destination: &dyn DestinationApi,
    users: &[User],
    mapping: &mut Mapping,
    fresh: &mut FreshEntities,
    tracker: &mut ProgressTracker<'_>,
) -> EntityCounts {
    let mut counts = EntityCounts::default();
    let total = users.len();
    tracker.stage(Stage::Users, total);

    for (idx, user) in users.iter().enumerate() {
        let mut resolved = Vec::with_capacity(1);

        if user.is_deleted() {
            debug!("[Import] User '{}' is deleted, skipping", user.username);
            counts.skipped += 1;
        } else if mapping.matrix_user_id(&user.id).is_some() {
            debug!("[Import] User '{}' already in mapping, skipping", user.username);
            counts.skipped += 1;
        } else {
            let exists = match destination.user_exists(&user.username).await {
                Ok(exists) => exists,
                Err(e) if e.is_remote_lookup_rejected() => {
                    debug!(
                        "[Import] Existence check unavailable for '{}', creating",
                        user.username
                    );
                    false
                }
                Err(e) => {
                    warn!(
                        "[Import] Existence check failed for '{}': {}, creating anyway",
                        user.username, e
                    );
                    false
                }
            };

            if exists {
                info!("[Import] User '{}' already exists", user.username);
                resolved.push((user.id.clone(), destination.format_user_id(&user.username)));
                counts.skipped += 1;
            } else {
                match destination
                    .create_user(&user.username, &user.display_name(), &generate_password())
                    .await
                {
                    Ok(Provisioned::Created(user_id)) => {
                        info!("[Import] Created user '{}' -> {}", user.username, user_id);
                        resolved.push((user.id.clone(), user_id));
                        counts.created += 1;
                    }
                    Ok(Provisioned::Existing(user_id)) => {
                        info!("[Import] User '{}' already exists -> {}", user.username, user_id);
                        resolved.push((user.id.clone(), user_id));
                        counts.skipped += 1;
                    }
                    Err(e) => {
                        error!("[Import] Failed to create user '{}': {}", user.username, e);
                        tracker.warn(format!("user '{}': {}", user.username, e));
                        counts.failed += 1;
                    }
                }
            }
        }

        fresh.users.extend(resolved.iter().map(|(id, _)| id.clone()));
        mapping.merge_users(resolved);
        tracker
            .advance(Stage::Users, idx + 1, total, Some(&user.username))
            .await;
    }

    counts
}

async fn import_teams_as_spaces(
    destination: &dyn DestinationApi,
    teams: &[Team],
    mapping: &mut Mapping,
    fresh: &mut FreshEntities,
    options: ImportOptions,
    tracker: &mut ProgressTracker<'_>,
) -> EntityCounts {
    let mut counts = EntityCounts::default();
    let total = teams.len();
    tracker.stage(Stage::Spaces, total);

    for (idx, team) in teams.iter().enumerate() {
        let mut resolved = Vec::with_capacity(1);

        if team.is_deleted() {
            counts.skipped += 1;
        } else if mapping.matrix_space_id(&team.id).is_some() {
            debug!("[Import] Space '{}' already imported, skipping", team.display_name);
            counts.skipped += 1;
        } else {
            let spec = RoomSpec {
                name: team.display_name.clone(),
                topic: Some(team.description.clone()).filter(|d| !d.trim().is_empty()),
                public: team.is_open(),
                alias: if options.room_aliases {
                    space_alias(team)
                } else {
                    None
                },
            };

            match destination.create_space(spec).await {
                Ok(Provisioned::Created(space_id)) => {
                    info!("[Import] Created space '{}' -> {}", team.display_name, space_id);
                    resolved.push((team.id.clone(), space_id));
                    counts.created += 1;
                }
                Ok(Provisioned::Existing(space_id)) => {
                    info!("[Import] Space '{}' already exists -> {}", team.display_name, space_id);
                    resolved.push((team.id.clone(), space_id));
                    counts.skipped += 1;
                }
                Err(e) => {
                    error!("[Import] Failed to create space '{}': {}", team.display_name, e);
                    tracker.warn(format!("space '{}': {}", team.display_name, e));
                    counts.failed += 1;
                }
            }
        }

        fresh.teams.extend(resolved.iter().map(|(id, _)| id.clone()));
        mapping.merge_teams(resolved);
        tracker
            .advance(Stage::Spaces, idx + 1, total, Some(&team.display_name))
            .await;
    }

    counts
}

async fn import_channels_as_rooms(
    destination: &dyn DestinationApi,
    channels: &[Channel],
    team_names: &HashMap<&str, &str>,
    mapping: &mut Mapping,
    fresh: &mut FreshEntities,
    options: ImportOptions,
    tracker: &mut ProgressTracker<'_>,
) -> EntityCounts {
    let mut counts = EntityCounts::default();
    let total = channels.len();
    tracker.stage(Stage::Rooms, total);

    for (idx, channel) in channels.iter().enumerate() {
        let mut resolved = Vec::with_capacity(1);

        if channel.is_deleted() || channel.is_conversation() {
            counts.skipped += 1;
        } else if mapping.matrix_room_id(&channel.id).is_some() {
            debug!("[Import] Room '{}' already imported, skipping", channel.display_name);
            counts.skipped += 1;
        } else {
            let name = if channel.display_name.trim().is_empty() {
                channel.name.clone()
            } else {
                channel.display_name.clone()
            };
            let spec = RoomSpec {
                name,
                topic: channel.topic(),
                public: channel.kind() == ChannelKind::Public,
                alias: if options.room_aliases {
                    room_alias(team_names.get(channel.team_id.as_str()).copied(), channel)
                } else {
                    None
                },
            };

            match destination.create_room(spec).await {
                Ok(Provisioned::Created(room_id)) => {
                    info!("[Import] Created room '{}' -> {}", channel.display_name, room_id);
                    resolved.push((channel.id.clone(), room_id));
                    counts.created += 1;
                }
                Ok(Provisioned::Existing(room_id)) => {
                    info!(
                        "[Import] Room '{}' already exists -> {}",
                        channel.display_name, room_id
                    );
                    resolved.push((channel.id.clone(), room_id));
                    counts.skipped += 1;
                }
                Err(e) => {
                    error!("[Import] Failed to create room '{}': {}", channel.display_name, e);
                    tracker.warn(format!("room '{}': {}", channel.display_name, e));
                    counts.failed += 1;
                }
            }
        }

        fresh.channels.extend(resolved.iter().map(|(id, _)| id.clone()));
        mapping.merge_channels(resolved);
        tracker
            .advance(Stage::Rooms, idx + 1, total, Some(&channel.display_name))
            .await;
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_passwords_are_alphanumeric() {
        let first = generate_password();
        let second = generate_password();
        assert_eq!(first.len(), PASSWORD_LENGTH);
        assert!(first.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(first, second);
    }

    #[test]
    fn test_sanitize_alias() {
        assert_eq!(sanitize_alias("Town Square").as_deref(), Some("town-square"));
        assert_eq!(sanitize_alias("dev_ops.team=1").as_deref(), Some("dev_ops.team=1"));
        assert_eq!(sanitize_alias("  Ünïcode! ").as_deref(), Some("n-code"));
        assert_eq!(sanitize_alias("!!!"), None);
    }

    #[test]
    fn test_room_alias_is_scoped_by_team() {
        let channel = Channel {
            name: "town-square".to_string(),
            ..Channel::default()
        };
        assert_eq!(
            room_alias(Some("engineering"), &channel).as_deref(),
            Some("engineering-town-square")
        );
        assert_eq!(room_alias(None, &channel).as_deref(), Some("town-square"));
        assert_eq!(room_alias(Some(""), &channel).as_deref(), Some("town-square"));
    }
}
