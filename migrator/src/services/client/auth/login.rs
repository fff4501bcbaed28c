use std::time::Duration;

use reqwest::Client;
use tracing::{error, info, instrument};

use crate::services::client::errors::{ClientError, ClientResult};
use crate::services::client::types::{LoginFlowsResponse, LoginRequest, LoginResponse};

const DEVICE_ID: &str = "matrixmigrate";
const DEVICE_DISPLAY_NAME: &str = "MatrixMigrate CLI";
const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

fn http_client(timeout: Duration) -> ClientResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ClientError::NetworkError {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

/// Password login. Setup-time only, so it is neither paced nor retried.
#[instrument(skip(password), err)]
pub async fn login(base_url: &str, username: &str, password: &str) -> ClientResult<LoginResponse> {
    let base_url = base_url.trim_end_matches('/');
    info!("[Auth] Logging in to {} as {}", base_url, username);

    let request = LoginRequest {
        login_type: "m.login.password",
        user: username,
        password,
        device_id: DEVICE_ID,
        initial_device_display_name: DEVICE_DISPLAY_NAME,
    };

    let response = http_client(LOGIN_TIMEOUT)?
        .post(format!("{}/_matrix/client/v3/login", base_url))
        .json(&request)
        .send()
        .await
        .map_err(|e| ClientError::NetworkError {
            message: format!("Login request failed: {}", e),
        })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ClientError::NetworkError {
            message: format!("Failed to read login response: {}", e),
        })?;

    if !status.is_success() {
        let err = ClientError::from_response("login", status.as_u16(), &body);
        error!("[Auth] Login failed: {}", err);
        return Err(ClientError::AuthenticationFailed {
            message: err.to_string(),
        });
    }

    let login: LoginResponse = serde_json::from_str(&body)?;
    if login.access_token.is_empty() {
        return Err(ClientError::AuthenticationFailed {
            message: "Login succeeded but no access token received".to_string(),
        });
    }

    info!("[Auth] Logged in as {}", login.user_id);
    Ok(login)
}

pub async fn login_flows(base_url: &str) -> ClientResult<LoginFlowsResponse> {
    let response = http_client(PROBE_TIMEOUT)?
        .get(format!("{}/_matrix/client/v3/login", base_url.trim_end_matches('/')))
        .send()
        .await
        .map_err(|e| ClientError::NetworkError {
            message: format!("Failed to get login flows: {}", e),
        })?;

    response
        .json()
        .await
        .map_err(|e| ClientError::InvalidResponse {
            expected: "login flows".to_string(),
            got: e.to_string(),
        })
}

pub async fn supports_password_login(base_url: &str) -> ClientResult<bool> {
    let flows = login_flows(base_url).await?;
    Ok(flows
        .flows
        .iter()
        .any(|flow| flow.flow_type == "m.login.password"))
}

/// Invalidate a token obtained through [`login`]
pub async fn logout(base_url: &str, access_token: &str) -> ClientResult<()> {
    let response = http_client(PROBE_TIMEOUT)?
        .post(format!("{}/_matrix/client/v3/logout", base_url.trim_end_matches('/')))
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| ClientError::NetworkError {
            message: format!("Logout request failed: {}", e),
        })?;

    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::from_response("logout", status.as_u16(), &body))
    }
}
