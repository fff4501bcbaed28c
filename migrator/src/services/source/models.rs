//! Mattermost records as exported to artifact files.
//!
//! Every record keeps Mattermost's soft-delete marker: `delete_at` is a
//! millisecond timestamp, zero while the record is active.

use serde::{Deserialize, Serialize};

pub const ARTIFACT_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub timezone: String,
    pub create_at: i64,
    pub update_at: i64,
    #[serde(default)]
    pub delete_at: i64,
    #[serde(default)]
    pub roles: String,
}

impl User {
    pub fn is_deleted(&self) -> bool {
        self.delete_at > 0
    }

    /// "First Last" when either is set, otherwise the username
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub email: String,
    /// `O` open, `I` invite only
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub team_type: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub allowed_domains: String,
    #[serde(default)]
    pub invite_id: String,
    #[serde(default)]
    pub allow_open_invite: bool,
    pub create_at: i64,
    pub update_at: i64,
    #[serde(default)]
    pub delete_at: i64,
}

impl Team {
    pub fn is_deleted(&self) -> bool {
        self.delete_at > 0
    }

    pub fn is_open(&self) -> bool {
        self.team_type == "O"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Public,
    Private,
    Direct,
    Group,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct Channel {
    pub id: String,
    /// Empty for channels outside any team
    #[serde(default)]
    pub team_id: String,
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub channel_type: String,
    pub create_at: i64,
    pub update_at: i64,
    #[serde(default)]
    pub delete_at: i64,
    #[serde(default)]
    pub creator_id: String,
    #[serde(default)]
    pub total_msg_count: i64,
}

impl Channel {
    pub fn is_deleted(&self) -> bool {
        self.delete_at > 0
    }

    pub fn kind(&self) -> ChannelKind {
        match self.channel_type.as_str() {
            "O" => ChannelKind::Public,
            "P" => ChannelKind::Private,
            "D" => ChannelKind::Direct,
            "G" => ChannelKind::Group,
            _ => ChannelKind::Other,
        }
    }

    /// Direct and group conversations have no stable room counterpart
    pub fn is_conversation(&self) -> bool {
        matches!(self.kind(), ChannelKind::Direct | ChannelKind::Group)
    }

    /// Room topic: the purpose, or the header when no purpose is set
    pub fn topic(&self) -> Option<String> {
        [&self.purpose, &self.header]
            .into_iter()
            .map(|text| text.trim())
            .find(|text| !text.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct TeamMember {
    pub team_id: String,
    pub user_id: String,
    #[serde(default)]
    pub roles: String,
    #[serde(default)]
    pub delete_at: i64,
}

impl TeamMember {
    pub fn is_deleted(&self) -> bool {
        self.delete_at > 0
    }

    pub fn is_admin(&self) -> bool {
        self.roles.split_whitespace().any(|role| role == "team_admin")
    }
}

/// Channel memberships are hard-deleted in Mattermost, so `delete_at` is
/// always zero when read from the database.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChannelMember {
    pub channel_id: String,
    pub user_id: String,
    #[serde(default)]
    pub roles: String,
    #[serde(default)]
    pub notify_props: String,
    #[serde(default)]
    pub last_viewed_at: i64,
    #[serde(default)]
    pub msg_count: i64,
    #[serde(default)]
    #[sqlx(default)]
    pub delete_at: i64,
}

impl ChannelMember {
    pub fn is_deleted(&self) -> bool {
        self.delete_at > 0
    }

    pub fn is_admin(&self) -> bool {
        self.roles
            .split_whitespace()
            .any(|role| role == "channel_admin")
    }
}

/// Artifact of the export-assets step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assets {
    pub exported_at: i64,
    pub version: String,
    pub users: Vec<User>,
    pub teams: Vec<Team>,
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportStats {
    pub users_total: usize,
    pub users_active: usize,
    pub teams_total: usize,
    pub teams_active: usize,
    pub channels_total: usize,
    pub channels_active: usize,
    pub channels_public: usize,
    pub channels_private: usize,
}

impl Assets {
    pub fn calculate_stats(&self) -> ExportStats {
        let mut stats = ExportStats {
            users_total: self.users.len(),
            teams_total: self.teams.len(),
            channels_total: self.channels.len(),
            ..ExportStats::default()
        };

        stats.users_active = self.users.iter().filter(|u| !u.is_deleted()).count();
        stats.teams_active = self.teams.iter().filter(|t| !t.is_deleted()).count();
        for channel in self.channels.iter().filter(|c| !c.is_deleted()) {
            stats.channels_active += 1;
            match channel.kind() {
                ChannelKind::Public => stats.channels_public += 1,
                ChannelKind::Private => stats.channels_private += 1,
                _ => {}
            }
        }

        stats
    }
}

/// Artifact of the export-memberships step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memberships {
    pub exported_at: i64,
    pub version: String,
    pub team_members: Vec<TeamMember>,
    pub channel_members: Vec<ChannelMember>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_falls_back_to_username() {
        let mut user = User {
            username: "jdoe".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            ..User::default()
        };
        assert_eq!(user.display_name(), "Jane Doe");

        user.last_name.clear();
        assert_eq!(user.display_name(), "Jane");

        user.first_name = "  ".to_string();
        assert_eq!(user.display_name(), "jdoe");
    }

    #[test]
    fn test_channel_topic_prefers_purpose() {
        let mut channel = Channel {
            header: "Header text".to_string(),
            purpose: "Purpose text".to_string(),
            ..Channel::default()
        };
        assert_eq!(channel.topic().as_deref(), Some("Purpose text"));

        channel.purpose.clear();
        assert_eq!(channel.topic().as_deref(), Some("Header text"));

        channel.header.clear();
        assert_eq!(channel.topic(), None);
    }

    #[test]
    fn test_channel_member_without_delete_marker_parses() {
        let member: ChannelMember =
            serde_json::from_str(r#"{"channel_id":"c1","user_id":"u1","roles":"channel_user"}"#)
                .unwrap();
        assert!(!member.is_deleted());
        assert!(!member.is_admin());
    }

    #[test]
    fn test_asset_stats() {
        let assets = Assets {
            exported_at: 0,
            version: ARTIFACT_VERSION.to_string(),
            users: vec![
                User::default(),
                User {
                    delete_at: 10,
                    ..User::default()
                },
            ],
            teams: vec![Team::default()],
            channels: vec![
                Channel {
                    channel_type: "O".to_string(),
                    ..Channel::default()
                },
                Channel {
                    channel_type: "P".to_string(),
                    ..Channel::default()
                },
                Channel {
                    channel_type: "G".to_string(),
                    ..Channel::default()
                },
                Channel {
                    channel_type: "O".to_string(),
                    delete_at: 5,
                    ..Channel::default()
                },
            ],
        };

        let stats = assets.calculate_stats();
        assert_eq!(stats.users_total, 2);
        assert_eq!(stats.users_active, 1);
        assert_eq!(stats.channels_active, 3);
        assert_eq!(stats.channels_public, 1);
        assert_eq!(stats.channels_private, 1);
    }
}
