#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use migrator::services::client::{
    ClientError, ClientResult, DestinationApi, Invitation, Provisioned, RoomSpec, WhoAmIResponse,
};
use migrator::services::config::Config;
use migrator::services::source::{
    Channel, ChannelMember, SourceError, SourceProvider, Team, TeamMember, User,
};

pub const HOMESERVER: &str = "matrix.example.org";

/// Config whose data paths all live under `root`
pub fn config_in(root: &Path) -> Config {
    let mut config = Config::default();
    config.matrix.homeserver = HOMESERVER.to_string();
    config.data.assets_dir = root.join("assets");
    config.data.mappings_dir = root.join("mappings");
    config.data.state_file = root.join("state.json");
    config
}

pub fn user(id: &str, username: &str) -> User {
    User {
        id: id.to_string(),
        username: username.to_string(),
        email: format!("{}@example.org", username),
        first_name: username.to_uppercase(),
        ..User::default()
    }
}

pub fn deleted_user(id: &str, username: &str) -> User {
    User {
        delete_at: 1_700_000_000_000,
        ..user(id, username)
    }
}

pub fn team(id: &str, name: &str) -> Team {
    Team {
        id: id.to_string(),
        name: name.to_string(),
        display_name: name.to_string(),
        team_type: "O".to_string(),
        ..Team::default()
    }
}

pub fn channel(id: &str, team_id: &str, name: &str) -> Channel {
    Channel {
        id: id.to_string(),
        team_id: team_id.to_string(),
        name: name.to_string(),
        display_name: name.to_string(),
        channel_type: "O".to_string(),
        ..Channel::default()
    }
}

pub fn conversation(id: &str, channel_type: &str) -> Channel {
    Channel {
        id: id.to_string(),
        name: format!("{}__{}", id, channel_type),
        channel_type: channel_type.to_string(),
        ..Channel::default()
    }
}

pub fn team_member(team_id: &str, user_id: &str) -> TeamMember {
    TeamMember {
        team_id: team_id.to_string(),
        user_id: user_id.to_string(),
        ..TeamMember::default()
    }
}

pub fn channel_member(channel_id: &str, user_id: &str) -> ChannelMember {
    ChannelMember {
        channel_id: channel_id.to_string(),
        user_id: user_id.to_string(),
        ..ChannelMember::default()
    }
}

#[derive(Default)]
pub struct FakeSource {
    pub users: Vec<User>,
    pub teams: Vec<Team>,
    pub channels: Vec<Channel>,
    pub team_members: Vec<TeamMember>,
    pub channel_members: Vec<ChannelMember>,
}

#[async_trait]
impl SourceProvider for FakeSource {
    async fn list_users(&self) -> Result<Vec<User>, SourceError> {
        Ok(self.users.clone())
    }

    async fn list_teams(&self) -> Result<Vec<Team>, SourceError> {
        Ok(self.teams.clone())
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, SourceError> {
        Ok(self.channels.clone())
    }

    async fn list_team_members(&self) -> Result<Vec<TeamMember>, SourceError> {
        Ok(self.team_members.clone())
    }

    async fn list_channel_members(&self) -> Result<Vec<ChannelMember>, SourceError> {
        Ok(self.channel_members.clone())
    }

    async fn count_users(&self) -> Result<i64, SourceError> {
        Ok(self.users.len() as i64)
    }

    async fn count_teams(&self) -> Result<i64, SourceError> {
        Ok(self.teams.len() as i64)
    }

    async fn count_channels(&self) -> Result<i64, SourceError> {
        Ok(self.channels.len() as i64)
    }

    async fn ping(&self) -> Result<(), SourceError> {
        Ok(())
    }
}

/// Destination that records every call and answers from in-memory sets
#[derive(Default)]
pub struct RecordingDestination {
    /// Localparts `user_exists` reports as present
    pub existing_users: HashSet<String>,
    /// Localparts whose create call answers `Existing`
    pub provisioned_users: HashSet<String>,
    /// Localparts whose create call fails
    pub failing_users: HashSet<String>,
    /// `room|user` pairs answered with `AlreadyMember`
    pub members: HashSet<String>,
    /// Existence checks answer like a homeserver refusing remote lookups
    pub lookup_rejected: bool,
    /// `add_room_to_space` fails for every room
    pub failing_links: bool,
    /// `set_room_parent` fails for every room
    pub failing_parents: bool,
    pub log: CallLog,
}

/// Handle on a destination's calls that survives boxing it
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.split(' ').next() == Some(operation))
            .count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    fn record(&self, call: String) -> usize {
        let mut calls = self.0.lock().unwrap();
        calls.push(call);
        calls.len()
    }
}

impl RecordingDestination {
    fn record(&self, call: String) -> usize {
        self.log.record(call)
    }
}

fn api_error(operation: &str, status: u16, message: &str) -> ClientError {
    ClientError::Api {
        operation: operation.to_string(),
        status,
        errcode: "M_UNKNOWN".to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl DestinationApi for RecordingDestination {
    fn homeserver(&self) -> &str {
        HOMESERVER
    }

    async fn whoami(&self) -> ClientResult<WhoAmIResponse> {
        Ok(WhoAmIResponse {
            user_id: format!("@admin:{}", HOMESERVER),
            device_id: None,
        })
    }

    async fn user_exists(&self, localpart: &str) -> ClientResult<bool> {
        self.record(format!("user_exists {}", localpart));
        if self.lookup_rejected {
            return Err(api_error("user_exists", 400, "Can only look up local users"));
        }
        Ok(self.existing_users.contains(localpart))
    }

    async fn create_user(
        &self,
        localpart: &str,
        _display_name: &str,
        _password: &str,
    ) -> ClientResult<Provisioned> {
        self.record(format!("create_user {}", localpart));
        if self.failing_users.contains(localpart) {
            return Err(api_error("create_user", 500, "internal error"));
        }
        let user_id = self.format_user_id(localpart);
        if self.provisioned_users.contains(localpart) {
            Ok(Provisioned::Existing(user_id))
        } else {
            Ok(Provisioned::Created(user_id))
        }
    }

    async fn create_space(&self, spec: RoomSpec) -> ClientResult<Provisioned> {
        let n = self.record(format!("create_space {}", spec.name));
        Ok(Provisioned::Created(format!("!space{}:{}", n, HOMESERVER)))
    }

    async fn create_room(&self, spec: RoomSpec) -> ClientResult<Provisioned> {
        let n = self.record(format!("create_room {}", spec.name));
        Ok(Provisioned::Created(format!("!room{}:{}", n, HOMESERVER)))
    }

    async fn invite_user(&self, room_id: &str, user_id: &str) -> ClientResult<Invitation> {
        self.record(format!("invite_user {} {}", room_id, user_id));
        if self.members.contains(&format!("{}|{}", room_id, user_id)) {
            Ok(Invitation::AlreadyMember)
        } else {
            Ok(Invitation::Invited)
        }
    }

    async fn add_room_to_space(&self, space_id: &str, room_id: &str) -> ClientResult<()> {
        self.record(format!("add_room_to_space {} {}", space_id, room_id));
        if self.failing_links {
            return Err(api_error("add_room_to_space", 403, "not allowed to send m.space.child"));
        }
        Ok(())
    }

    async fn set_room_parent(&self, room_id: &str, space_id: &str) -> ClientResult<()> {
        self.record(format!("set_room_parent {} {}", room_id, space_id));
        if self.failing_parents {
            return Err(api_error("set_room_parent", 403, "not allowed to send m.space.parent"));
        }
        Ok(())
    }
}
