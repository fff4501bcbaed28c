use async_trait::async_trait;
use thiserror::Error;

use super::models::{Channel, ChannelMember, Team, TeamMember, User};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to connect to database: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Failed to query {what}: {source}")]
    Query {
        what: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Mattermost config error: {message}")]
    Config { message: String },

    #[error("Unsupported database driver '{driver}', only postgres is supported")]
    UnsupportedDriver { driver: String },
}

impl SourceError {
    pub fn query(what: &str, source: sqlx::Error) -> Self {
        SourceError::Query {
            what: what.to_string(),
            source,
        }
    }

    pub fn is_connection_error(&self) -> bool {
        match self {
            SourceError::Connection(_) => true,
            SourceError::Query { source, .. } => matches!(
                source,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}

/// Read-only record source for the export pipelines.
///
/// Lists are returned in stable creation order.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn list_users(&self) -> Result<Vec<User>, SourceError>;

    async fn list_teams(&self) -> Result<Vec<Team>, SourceError>;

    /// Public, private and group channels. Direct messages are not listed.
    async fn list_channels(&self) -> Result<Vec<Channel>, SourceError>;

    async fn list_team_members(&self) -> Result<Vec<TeamMember>, SourceError>;

    async fn list_channel_members(&self) -> Result<Vec<ChannelMember>, SourceError>;

    async fn count_users(&self) -> Result<i64, SourceError>;

    async fn count_teams(&self) -> Result<i64, SourceError>;

    async fn count_channels(&self) -> Result<i64, SourceError>;

    async fn ping(&self) -> Result<(), SourceError>;

    async fn close(&self) {}
}
