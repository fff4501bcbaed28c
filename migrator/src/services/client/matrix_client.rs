use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::errors::{ClientError, ClientResult};
use super::rate_limit::{backoff_delay, parse_retry_after, RateLimitConfig, RequestPacer};
use super::types::*;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw answer from the homeserver once throttling has been dealt with
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    /// Decode a 2xx body, or turn anything else into [`ClientError::Api`]
    pub fn into_json<T: DeserializeOwned>(self, operation: &str) -> ClientResult<T> {
        if !self.status.is_success() {
            return Err(self.into_error(operation));
        }
        serde_json::from_str(&self.body).map_err(|e| ClientError::InvalidResponse {
            expected: format!("{} response", operation),
            got: e.to_string(),
        })
    }

    pub fn into_error(self, operation: &str) -> ClientError {
        ClientError::from_response(operation, self.status.as_u16(), &self.body)
    }
}

/// Authenticated client for the Matrix client-server and Synapse admin APIs
pub struct MatrixClient {
    pub(crate) http_client: Client,
    base_url: String,
    access_token: String,
    homeserver: String,
    rate_limit: RateLimitConfig,
    pacer: RequestPacer,
    txn_counter: AtomicU64,
}

impl MatrixClient {
    pub fn new(
        base_url: &str,
        access_token: &str,
        homeserver: &str,
        rate_limit: RateLimitConfig,
        timeout: Duration,
    ) -> ClientResult<Self> {
        let http_client = Client::builder()
            .user_agent(concat!("matrixmigrate/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::NetworkError {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            homeserver: homeserver.to_string(),
            pacer: RequestPacer::new(&rate_limit),
            rate_limit,
            txn_counter: AtomicU64::new(0),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn homeserver(&self) -> &str {
        &self.homeserver
    }

    pub fn set_homeserver(&mut self, homeserver: &str) {
        self.homeserver = homeserver.to_string();
    }

    pub fn rate_limit(&self) -> &RateLimitConfig {
        &self.rate_limit
    }

    pub fn format_user_id(&self, localpart: &str) -> String {
        format!("@{}:{}", localpart, self.homeserver)
    }

    /// Transaction id unique for the lifetime of this client
    pub fn next_txn_id(&self) -> String {
        let counter = self.txn_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!(
            "mmx_{}_{}",
            chrono::Utc::now().timestamp_millis(),
            counter
        )
    }

    /// Send one request, pacing it and retrying on `429` until the retry
    /// budget is spent. Other statuses are handed back untouched.
    pub async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> ClientResult<ApiResponse> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut retry_count = 0;

        loop {
            self.pacer.wait().await;

            let mut request = self
                .http_client
                .request(method.clone(), &url)
                .bearer_auth(&self.access_token);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await.map_err(|e| ClientError::NetworkError {
                message: format!("{} {} failed: {}", method, endpoint, e),
            })?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if retry_count >= self.rate_limit.max_retries {
                    warn!(
                        "[MatrixClient] {} {} still throttled after {} retries",
                        method, endpoint, retry_count
                    );
                    return Err(ClientError::RateLimitExceeded {
                        retries: retry_count,
                    });
                }

                let hint = parse_retry_after(response.headers().get(RETRY_AFTER));
                let delay = backoff_delay(retry_count, hint, self.rate_limit.retry_base_delay);
                debug!(
                    "[MatrixClient] {} {} throttled, retry {} in {:?}",
                    method,
                    endpoint,
                    retry_count + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            let body = response.text().await.map_err(|e| ClientError::NetworkError {
                message: format!("Failed to read response for {} {}: {}", method, endpoint, e),
            })?;

            return Ok(ApiResponse { status, body });
        }
    }

    #[instrument(skip(self), err)]
    pub async fn whoami(&self) -> ClientResult<WhoAmIResponse> {
        self.send(Method::GET, "/_matrix/client/v3/account/whoami", None)
            .await?
            .into_json("whoami")
    }

    /// Server name of the account behind the access token
    pub async fn detect_homeserver(&self) -> ClientResult<String> {
        let whoami = self.whoami().await?;
        whoami
            .server_name()
            .map(str::to_string)
            .ok_or_else(|| ClientError::InvalidResponse {
                expected: "user id of the form @user:server".to_string(),
                got: whoami.user_id.clone(),
            })
    }

    #[instrument(skip(self, password), err)]
    pub async fn create_user(
        &self,
        localpart: &str,
        display_name: &str,
        password: &str,
    ) -> ClientResult<Provisioned> {
        super::api::users::create_user_impl(self, localpart, display_name, password).await
    }

    #[instrument(skip(self), err)]
    pub async fn get_user(&self, user_id: &str) -> ClientResult<Option<UserResponse>> {
        super::api::users::get_user_impl(self, user_id).await
    }

    pub async fn user_exists(&self, localpart: &str) -> ClientResult<bool> {
        let user_id = self.format_user_id(localpart);
        Ok(self.get_user(&user_id).await?.is_some())
    }

    #[instrument(skip(self), err)]
    pub async fn create_space(&self, spec: RoomSpec) -> ClientResult<Provisioned> {
        super::api::rooms::create_room_impl(self, spec.into_request(true)).await
    }

    #[instrument(skip(self), err)]
    pub async fn create_regular_room(&self, spec: RoomSpec) -> ClientResult<Provisioned> {
        super::api::rooms::create_room_impl(self, spec.into_request(false)).await
    }

    #[instrument(skip(self), err)]
    pub async fn resolve_room_alias(&self, alias: &str) -> ClientResult<Option<String>> {
        super::api::rooms::resolve_room_alias_impl(self, alias).await
    }

    #[instrument(skip(self), err)]
    pub async fn invite_user(&self, room_id: &str, user_id: &str) -> ClientResult<Invitation> {
        super::api::rooms::invite_user_impl(self, room_id, user_id).await
    }

    #[instrument(skip(self), err)]
    pub async fn join_room(&self, room_id: &str) -> ClientResult<()> {
        super::api::rooms::join_room_impl(self, room_id).await
    }

    #[instrument(skip(self), err)]
    pub async fn add_room_to_space(
        &self,
        space_id: &str,
        room_id: &str,
        suggested: bool,
    ) -> ClientResult<()> {
        super::api::rooms::add_room_to_space_impl(self, space_id, room_id, suggested).await
    }

    #[instrument(skip(self), err)]
    pub async fn set_room_parent(
        &self,
        room_id: &str,
        space_id: &str,
        canonical: bool,
    ) -> ClientResult<()> {
        super::api::rooms::set_room_parent_impl(self, room_id, space_id, canonical).await
    }
}

/// Percent-encode one path segment (user ids, room ids and aliases carry `@ ! # :`)
pub(crate) fn encode_path_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> MatrixClient {
        MatrixClient::new(
            "http://127.0.0.1:8008/",
            "token",
            "example.org",
            RateLimitConfig::default(),
            DEFAULT_REQUEST_TIMEOUT,
        )
        .unwrap()
    }

    #[test]
    fn test_txn_ids_are_unique() {
        let client = client();
        let first = client.next_txn_id();
        let second = client.next_txn_id();

        assert!(first.starts_with("mmx_"));
        assert!(first.ends_with("_1"));
        assert!(second.ends_with("_2"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_user_id_uses_current_homeserver() {
        let mut client = client();
        assert_eq!(client.base_url(), "http://127.0.0.1:8008");
        assert_eq!(client.format_user_id("alice"), "@alice:example.org");

        client.set_homeserver("matrix.example.org");
        assert_eq!(client.format_user_id("alice"), "@alice:matrix.example.org");
    }

    #[test]
    fn test_encode_path_segment() {
        assert_eq!(encode_path_segment("@alice:example.org"), "%40alice%3Aexample.org");
        assert_eq!(encode_path_segment("#town-square:hs"), "%23town-square%3Ahs");
        assert_eq!(encode_path_segment("!abc:hs"), "%21abc%3Ahs");
    }
}
