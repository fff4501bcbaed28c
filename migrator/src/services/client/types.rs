use serde::{Deserialize, Serialize};

/// Response from `/_matrix/client/v3/account/whoami`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhoAmIResponse {
    pub user_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

impl WhoAmIResponse {
    /// Server name portion of the user id (`@admin:example.org` -> `example.org`)
    pub fn server_name(&self) -> Option<&str> {
        self.user_id
            .split_once(':')
            .map(|(_, domain)| domain)
            .filter(|domain| !domain.is_empty())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    #[serde(rename = "type")]
    pub login_type: &'a str,
    pub user: &'a str,
    pub password: &'a str,
    pub device_id: &'a str,
    pub initial_device_display_name: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub access_token: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub home_server: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginFlow {
    #[serde(rename = "type")]
    pub flow_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginFlowsResponse {
    #[serde(default)]
    pub flows: Vec<LoginFlow>,
}

/// Body for the Synapse admin create-or-modify user endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CreateUserRequest {
    pub password: String,
    pub displayname: String,
    pub admin: bool,
    pub deactivated: bool,
}

/// Subset of the Synapse admin user representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub name: String,
    #[serde(default)]
    pub displayname: Option<String>,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub deactivated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub visibility: &'static str,
    pub preset: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_alias_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_content: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub room_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomAliasResponse {
    pub room_id: String,
    #[serde(default)]
    pub servers: Vec<String>,
}

/// What a pipeline asks the destination to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSpec {
    pub name: String,
    pub topic: Option<String>,
    pub public: bool,
    /// Local part of a canonical alias. Lets a repeated create resolve to the same room.
    pub alias: Option<String>,
}

impl RoomSpec {
    pub(crate) fn into_request(self, space: bool) -> CreateRoomRequest {
        let (visibility, preset) = if self.public {
            ("public", "public_chat")
        } else {
            ("private", "private_chat")
        };

        CreateRoomRequest {
            name: self.name,
            topic: self.topic.filter(|topic| !topic.is_empty()),
            visibility,
            preset,
            room_alias_name: self.alias,
            creation_content: space.then(|| serde_json::json!({ "type": "m.space" })),
        }
    }
}

/// Outcome of an idempotent create call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned {
    Created(String),
    Existing(String),
}

impl Provisioned {
    pub fn id(&self) -> &str {
        match self {
            Provisioned::Created(id) | Provisioned::Existing(id) => id,
        }
    }

    pub fn into_id(self) -> String {
        match self {
            Provisioned::Created(id) | Provisioned::Existing(id) => id,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Provisioned::Created(_))
    }
}

/// Outcome of an invite call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invitation {
    Invited,
    AlreadyMember,
}
