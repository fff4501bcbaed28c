//! User provisioning through the Synapse admin API

use reqwest::{Method, StatusCode};
use tracing::{debug, info};

use crate::services::client::errors::ClientResult;
use crate::services::client::matrix_client::encode_path_segment;
use crate::services::client::types::{CreateUserRequest, Provisioned, UserResponse};
use crate::services::client::MatrixClient;

/// Create a local user, or report the one that is already there.
///
/// Synapse answers `201` for a new account and `200` when the account existed
/// and was updated in place.
pub async fn create_user_impl(
    client: &MatrixClient,
    localpart: &str,
    display_name: &str,
    password: &str,
) -> ClientResult<Provisioned> {
    let user_id = client.format_user_id(localpart);
    let endpoint = format!("/_synapse/admin/v2/users/{}", encode_path_segment(&user_id));

    let request = CreateUserRequest {
        password: password.to_string(),
        displayname: display_name.to_string(),
        admin: false,
        deactivated: false,
    };
    let body = serde_json::to_value(&request)?;

    let response = client.send(Method::PUT, &endpoint, Some(&body)).await?;
    match response.status {
        StatusCode::CREATED => {
            info!("[MatrixClient] Created user {}", user_id);
            Ok(Provisioned::Created(user_id))
        }
        StatusCode::OK => {
            debug!("[MatrixClient] User {} already existed", user_id);
            Ok(Provisioned::Existing(user_id))
        }
        _ => {
            let err = response.into_error("create_user");
            if err.is_already_exists() {
                debug!("[MatrixClient] User {} already exists: {}", user_id, err);
                Ok(Provisioned::Existing(user_id))
            } else {
                Err(err)
            }
        }
    }
}

/// Admin lookup of a user. `None` when the homeserver does not know the id.
pub async fn get_user_impl(
    client: &MatrixClient,
    user_id: &str,
) -> ClientResult<Option<UserResponse>> {
    let endpoint = format!("/_synapse/admin/v2/users/{}", encode_path_segment(user_id));
    let response = client.send(Method::GET, &endpoint, None).await?;

    if response.status == StatusCode::NOT_FOUND {
        return Ok(None);
    }

    match response.into_json::<UserResponse>("get_user") {
        Ok(user) => Ok(Some(user)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}
