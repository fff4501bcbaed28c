//! Room, space and membership operations

use reqwest::Method;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::services::client::errors::ClientResult;
use crate::services::client::matrix_client::encode_path_segment;
use crate::services::client::types::{
    CreateRoomRequest, CreateRoomResponse, Invitation, Provisioned, RoomAliasResponse,
};
use crate::services::client::MatrixClient;

/// Create a room or space.
///
/// When the request carries an alias that is already taken, the alias is
/// resolved and the room behind it is returned as [`Provisioned::Existing`].
pub async fn create_room_impl(
    client: &MatrixClient,
    request: CreateRoomRequest,
) -> ClientResult<Provisioned> {
    let body = serde_json::to_value(&request)?;
    let response = client
        .send(Method::POST, "/_matrix/client/v3/createRoom", Some(&body))
        .await?;

    if response.status.is_success() {
        let created: CreateRoomResponse = response.into_json("create_room")?;
        info!("[MatrixClient] Created room '{}' -> {}", request.name, created.room_id);
        return Ok(Provisioned::Created(created.room_id));
    }

    let err = response.into_error("create_room");
    let Some(alias) = request.room_alias_name.as_deref() else {
        return Err(err);
    };

    if err.errcode() == Some("M_ROOM_IN_USE") {
        let full_alias = format!("#{}:{}", alias, client.homeserver());
        if let Some(room_id) = resolve_room_alias_impl(client, &full_alias).await? {
            debug!("[MatrixClient] Alias {} already points to {}", full_alias, room_id);
            return Ok(Provisioned::Existing(room_id));
        }
        warn!("[MatrixClient] Alias {} reported in use but did not resolve", full_alias);
    }

    Err(err)
}

pub async fn resolve_room_alias_impl(
    client: &MatrixClient,
    alias: &str,
) -> ClientResult<Option<String>> {
    let endpoint = format!(
        "/_matrix/client/v3/directory/room/{}",
        encode_path_segment(alias)
    );
    let response = client.send(Method::GET, &endpoint, None).await?;
    match response.into_json::<RoomAliasResponse>("resolve_room_alias") {
        Ok(resolved) => Ok(Some(resolved.room_id)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

pub async fn invite_user_impl(
    client: &MatrixClient,
    room_id: &str,
    user_id: &str,
) -> ClientResult<Invitation> {
    let endpoint = format!(
        "/_matrix/client/v3/rooms/{}/invite",
        encode_path_segment(room_id)
    );
    let body = json!({ "user_id": user_id });
    let response = client.send(Method::POST, &endpoint, Some(&body)).await?;

    if response.status.is_success() {
        return Ok(Invitation::Invited);
    }

    let err = response.into_error("invite_user");
    if err.is_already_member() {
        debug!("[MatrixClient] {} is already in {}", user_id, room_id);
        return Ok(Invitation::AlreadyMember);
    }
    Err(err)
}

pub async fn join_room_impl(client: &MatrixClient, room_id: &str) -> ClientResult<()> {
    let endpoint = format!("/_matrix/client/v3/join/{}", encode_path_segment(room_id));
    let response = client.send(Method::POST, &endpoint, Some(&json!({}))).await?;
    if response.status.is_success() {
        Ok(())
    } else {
        Err(response.into_error("join_room"))
    }
}

pub async fn add_room_to_space_impl(
    client: &MatrixClient,
    space_id: &str,
    room_id: &str,
    suggested: bool,
) -> ClientResult<()> {
    let content = json!({
        "via": [client.homeserver()],
        "suggested": suggested,
    });
    put_state_event(client, space_id, "m.space.child", room_id, &content, "add_room_to_space")
        .await
}

pub async fn set_room_parent_impl(
    client: &MatrixClient,
    room_id: &str,
    space_id: &str,
    canonical: bool,
) -> ClientResult<()> {
    let content = json!({
        "via": [client.homeserver()],
        "canonical": canonical,
    });
    put_state_event(client, room_id, "m.space.parent", space_id, &content, "set_room_parent")
        .await
}

async fn put_state_event(
    client: &MatrixClient,
    room_id: &str,
    event_type: &str,
    state_key: &str,
    content: &serde_json::Value,
    operation: &str,
) -> ClientResult<()> {
    let endpoint = format!(
        "/_matrix/client/v3/rooms/{}/state/{}/{}",
        encode_path_segment(room_id),
        event_type,
        encode_path_segment(state_key)
    );
    let response = client.send(Method::PUT, &endpoint, Some(content)).await?;
    if response.status.is_success() {
        Ok(())
    } else {
        Err(response.into_error(operation))
    }
}
