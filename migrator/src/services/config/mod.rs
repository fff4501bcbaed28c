mod loader;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::client::RateLimitConfig;

pub use loader::{expand_path, DEFAULT_CONFIG_FILE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{field}: {message}")]
    Invalid { field: String, message: String },

    #[error("Environment variable {var} (from {field}) is not set")]
    MissingSecret { field: String, var: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: &str) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Top-level configuration, usually read from `config.yaml`.
///
/// Secrets never live in the file: every `*_env` field names an environment
/// variable that holds the actual value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mattermost: MattermostConfig,
    pub matrix: MatrixConfig,
    pub data: DataConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MattermostConfig {
    pub ssh: SshConfig,
    /// Location of Mattermost's `config.json` on the remote host
    pub config_path: String,
    /// Manual override; when unset the credentials come from `config.json`
    pub database: DatabaseConfig,
}

impl Default for MattermostConfig {
    fn default() -> Self {
        Self {
            ssh: SshConfig::default(),
            config_path: "/opt/mattermost/config/config.json".to_string(),
            database: DatabaseConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key_path: String,
    pub passphrase_env: String,
    pub password_env: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            user: String::new(),
            key_path: String::new(),
            passphrase_env: String::new(),
            password_env: String::new(),
        }
    }
}

impl SshConfig {
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty()
    }

    pub fn passphrase(&self) -> Option<String> {
        read_env(&self.passphrase_env)
    }

    pub fn password(&self) -> Option<String> {
        read_env(&self.password_env)
    }

    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        if !self.is_configured() {
            return Ok(());
        }
        if self.user.is_empty() {
            return Err(ConfigError::invalid(
                &format!("{}.ssh.user", section),
                "is required when ssh.host is set",
            ));
        }
        if self.key_path.is_empty() && self.password_env.is_empty() {
            return Err(ConfigError::invalid(
                &format!("{}.ssh", section),
                "either key_path or password_env is required",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password_env: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: String::new(),
            user: String::new(),
            password_env: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixConfig {
    pub ssh: SshConfig,
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub homeserver: String,
    pub rate_limit: RateLimitSettings,
    /// Give spaces and rooms canonical aliases so re-creating them is detectable
    pub room_aliases: bool,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            ssh: SshConfig::default(),
            api: ApiConfig::default(),
            auth: AuthConfig::default(),
            homeserver: String::new(),
            rate_limit: RateLimitSettings::default(),
            room_aliases: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub admin_token_env: String,
    /// Synapse port on the remote host when the API is reached through a tunnel
    pub remote_port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8008".to_string(),
            admin_token_env: String::new(),
            remote_port: 8008,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub username: String,
    pub password_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub requests_per_second: f64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_second: 5.0,
            max_retries: 5,
            retry_base_delay_ms: 2000,
            request_timeout_secs: 30,
        }
    }
}

impl RateLimitSettings {
    pub fn to_rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_second: self.requests_per_second,
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub assets_dir: PathBuf,
    pub mappings_dir: PathBuf,
    pub state_file: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from("./data/assets"),
            mappings_dir: PathBuf::from("./data/mappings"),
            state_file: PathBuf::from("./data/state.json"),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.mattermost.ssh.validate("mattermost")?;
        self.matrix.ssh.validate("matrix")?;

        if self.matrix.ssh.is_configured() {
            if self.matrix.homeserver.is_empty() {
                return Err(ConfigError::invalid("matrix.homeserver", "is required"));
            }
            let has_auth =
                !self.matrix.auth.username.is_empty() && !self.matrix.auth.password_env.is_empty();
            let has_token = !self.matrix.api.admin_token_env.is_empty();
            if !has_auth && !has_token {
                return Err(ConfigError::invalid(
                    "matrix",
                    "either auth (username/password_env) or api.admin_token_env is required",
                ));
            }
        }

        if self.matrix.rate_limit.requests_per_second < 0.0 {
            return Err(ConfigError::invalid(
                "matrix.rate_limit.requests_per_second",
                "must not be negative",
            ));
        }

        Ok(())
    }

    pub fn has_manual_database_config(&self) -> bool {
        let db = &self.mattermost.database;
        !db.host.is_empty() && !db.name.is_empty() && !db.user.is_empty()
    }

    pub fn mattermost_db_password(&self) -> Option<String> {
        read_env(&self.mattermost.database.password_env)
    }

    pub fn matrix_admin_token(&self) -> Option<String> {
        read_env(&self.matrix.api.admin_token_env)
    }

    pub fn matrix_password(&self) -> Option<String> {
        read_env(&self.matrix.auth.password_env)
    }

    pub fn matrix_api_url(&self) -> String {
        self.matrix.api.base_url.trim_end_matches('/').to_string()
    }

    pub fn format_user_id(&self, localpart: &str) -> String {
        format!("@{}:{}", localpart, self.matrix.homeserver)
    }

    pub fn ensure_data_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data.assets_dir)?;
        std::fs::create_dir_all(&self.data.mappings_dir)?;
        if let Some(parent) = self.data.state_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

fn read_env(var: &str) -> Option<String> {
    if var.is_empty() {
        return None;
    }
    std::env::var(var).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.mattermost.ssh.port, 22);
        assert_eq!(config.mattermost.database.port, 5432);
        assert_eq!(config.matrix.api.base_url, "http://localhost:8008");
        assert_eq!(config.matrix.rate_limit.max_retries, 5);
        assert_eq!(config.data.state_file, PathBuf::from("./data/state.json"));
        assert!(config.matrix.room_aliases);
        assert!(!config.has_manual_database_config());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ssh_host_requires_credentials() {
        let mut config = Config::default();
        config.mattermost.ssh.host = "mm.example.org".to_string();
        config.mattermost.ssh.user = "deploy".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("key_path or password_env"));

        config.mattermost.ssh.key_path = "/home/deploy/.ssh/id_ed25519".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_matrix_tunnel_requires_auth_source() {
        let mut config = Config::default();
        config.matrix.ssh.host = "matrix.example.org".to_string();
        config.matrix.ssh.user = "root".to_string();
        config.matrix.ssh.password_env = "MATRIX_SSH_PASSWORD".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().starts_with("matrix.homeserver"));

        config.matrix.homeserver = "example.org".to_string();
        assert!(config.validate().is_err());

        config.matrix.api.admin_token_env = "MATRIX_ADMIN_TOKEN".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rate_limit_conversion() {
        let settings = RateLimitSettings {
            requests_per_second: 2.0,
            max_retries: 3,
            retry_base_delay_ms: 500,
            request_timeout_secs: 0,
        };
        let rate_limit = settings.to_rate_limit();
        assert_eq!(rate_limit.max_retries, 3);
        assert_eq!(rate_limit.retry_base_delay, Duration::from_millis(500));
        assert_eq!(settings.request_timeout(), Duration::from_secs(1));
    }
}
