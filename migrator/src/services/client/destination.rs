use async_trait::async_trait;

use super::errors::ClientResult;
use super::matrix_client::MatrixClient;
use super::types::{Invitation, Provisioned, RoomSpec, WhoAmIResponse};

/// Operations the import pipelines need from the destination homeserver.
///
/// Create calls are idempotent: an entity that already exists comes back as
/// [`Provisioned::Existing`] rather than an error.
#[async_trait]
pub trait DestinationApi: Send + Sync {
    fn homeserver(&self) -> &str;

    fn format_user_id(&self, localpart: &str) -> String {
        format!("@{}:{}", localpart, self.homeserver())
    }

    async fn whoami(&self) -> ClientResult<WhoAmIResponse>;

    async fn user_exists(&self, localpart: &str) -> ClientResult<bool>;

    async fn create_user(
        &self,
        localpart: &str,
        display_name: &str,
        password: &str,
    ) -> ClientResult<Provisioned>;

    async fn create_space(&self, spec: RoomSpec) -> ClientResult<Provisioned>;

    async fn create_room(&self, spec: RoomSpec) -> ClientResult<Provisioned>;

    async fn invite_user(&self, room_id: &str, user_id: &str) -> ClientResult<Invitation>;

    async fn add_room_to_space(&self, space_id: &str, room_id: &str) -> ClientResult<()>;

    async fn set_room_parent(&self, room_id: &str, space_id: &str) -> ClientResult<()>;
}

#[async_trait]
impl DestinationApi for MatrixClient {
    fn homeserver(&self) -> &str {
        MatrixClient::homeserver(self)
    }

    async fn whoami(&self) -> ClientResult<WhoAmIResponse> {
        MatrixClient::whoami(self).await
    }

    async fn user_exists(&self, localpart: &str) -> ClientResult<bool> {
        MatrixClient::user_exists(self, localpart).await
    }

    async fn create_user(
        &self,
        localpart: &str,
        display_name: &str,
        password: &str,
    ) -> ClientResult<Provisioned> {
        MatrixClient::create_user(self, localpart, display_name, password).await
    }

    async fn create_space(&self, spec: RoomSpec) -> ClientResult<Provisioned> {
        MatrixClient::create_space(self, spec).await
    }

    async fn create_room(&self, spec: RoomSpec) -> ClientResult<Provisioned> {
        self.create_regular_room(spec).await
    }

    async fn invite_user(&self, room_id: &str, user_id: &str) -> ClientResult<Invitation> {
        MatrixClient::invite_user(self, room_id, user_id).await
    }

    async fn add_room_to_space(&self, space_id: &str, room_id: &str) -> ClientResult<()> {
        MatrixClient::add_room_to_space(self, space_id, room_id, true).await
    }

    async fn set_room_parent(&self, room_id: &str, space_id: &str) -> ClientResult<()> {
        MatrixClient::set_room_parent(self, room_id, space_id, true).await
    }
}
