use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{PgPool, Postgres};
use tracing::{debug, info};

use super::config_reader::DatabaseCredentials;
use super::models::{Channel, ChannelMember, Team, TeamMember, User};
use super::provider::{SourceError, SourceProvider};

const USERS_QUERY: &str = r#"
    SELECT
        id, username, email,
        COALESCE(firstname, '') AS first_name,
        COALESCE(lastname, '') AS last_name,
        COALESCE(nickname, '') AS nickname,
        COALESCE(position, '') AS position,
        COALESCE(locale, 'en') AS locale,
        COALESCE(timezone::text, '{}') AS timezone,
        createat AS create_at, updateat AS update_at, deleteat AS delete_at,
        COALESCE(roles, '') AS roles
    FROM users
    ORDER BY createat ASC
"#;

const TEAMS_QUERY: &str = r#"
    SELECT
        id, name, displayname AS display_name,
        COALESCE(description, '') AS description,
        COALESCE(email, '') AS email,
        type::text AS type,
        COALESCE(companyname, '') AS company_name,
        COALESCE(alloweddomains, '') AS allowed_domains,
        COALESCE(inviteid, '') AS invite_id,
        COALESCE(allowopeninvite, false) AS allow_open_invite,
        createat AS create_at, updateat AS update_at, deleteat AS delete_at
    FROM teams
    ORDER BY createat ASC
"#;

const CHANNELS_QUERY: &str = r#"
    SELECT
        id,
        COALESCE(teamid, '') AS team_id,
        name, displayname AS display_name,
        COALESCE(header, '') AS header,
        COALESCE(purpose, '') AS purpose,
        type::text AS type,
        createat AS create_at, updateat AS update_at, deleteat AS delete_at,
        COALESCE(creatorid, '') AS creator_id,
        COALESCE(totalmsgcount, 0) AS total_msg_count
    FROM channels
    WHERE type IN ('O', 'P', 'G')
    ORDER BY createat ASC
"#;

const TEAM_MEMBERS_QUERY: &str = r#"
    SELECT
        teamid AS team_id, userid AS user_id,
        COALESCE(roles, '') AS roles,
        deleteat AS delete_at
    FROM teammembers
    ORDER BY teamid, userid
"#;

const CHANNEL_MEMBERS_QUERY: &str = r#"
    SELECT
        channelid AS channel_id, userid AS user_id,
        COALESCE(roles, '') AS roles,
        COALESCE(notifyprops::text, '{}') AS notify_props,
        COALESCE(lastviewedat, 0) AS last_viewed_at,
        COALESCE(msgcount, 0) AS msg_count
    FROM channelmembers
    ORDER BY channelid, userid
"#;

/// Mattermost's PostgreSQL database.
///
/// `teams.type` and `channels.type` are enum columns on recent schemas, so they
/// are read back as text.
pub struct PostgresSource {
    pub pool: PgPool,
}

impl PostgresSource {
    pub async fn connect(credentials: &DatabaseCredentials) -> Result<Self, SourceError> {
        let ssl_mode = credentials
            .ssl_mode
            .parse::<PgSslMode>()
            .unwrap_or(PgSslMode::Prefer);

        let options = PgConnectOptions::new()
            .host(&credentials.host)
            .port(credentials.port)
            .username(&credentials.user)
            .password(&credentials.password)
            .database(&credentials.database)
            .ssl_mode(ssl_mode);

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .map_err(SourceError::Connection)?;

        info!(
            "[Source] Connected to {}:{}/{}",
            credentials.host, credentials.port, credentials.database
        );
        Ok(Self { pool })
    }

    async fn fetch_all<T>(&self, what: &str, query: &'static str) -> Result<Vec<T>, SourceError>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        let rows = sqlx::query_as::<Postgres, T>(query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SourceError::query(what, e))?;
        debug!("[Source] Fetched {} {}", rows.len(), what);
        Ok(rows)
    }

    async fn count(&self, what: &str, query: &'static str) -> Result<i64, SourceError> {
        sqlx::query_scalar::<Postgres, i64>(query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SourceError::query(what, e))
    }
}

#[async_trait]
impl SourceProvider for PostgresSource {
    async fn list_users(&self) -> Result<Vec<User>, SourceError> {
        self.fetch_all("users", USERS_QUERY).await
    }

    async fn list_teams(&self) -> Result<Vec<Team>, SourceError> {
        self.fetch_all("teams", TEAMS_QUERY).await
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, SourceError> {
        self.fetch_all("channels", CHANNELS_QUERY).await
    }

    async fn list_team_members(&self) -> Result<Vec<TeamMember>, SourceError> {
        self.fetch_all("team members", TEAM_MEMBERS_QUERY).await
    }

    async fn list_channel_members(&self) -> Result<Vec<ChannelMember>, SourceError> {
        self.fetch_all("channel members", CHANNEL_MEMBERS_QUERY).await
    }

    async fn count_users(&self) -> Result<i64, SourceError> {
        self.count("users", "SELECT COUNT(*) FROM users").await
    }

    async fn count_teams(&self) -> Result<i64, SourceError> {
        self.count("teams", "SELECT COUNT(*) FROM teams").await
    }

    async fn count_channels(&self) -> Result<i64, SourceError> {
        self.count(
            "channels",
            "SELECT COUNT(*) FROM channels WHERE type IN ('O', 'P', 'G')",
        )
        .await
    }

    async fn ping(&self) -> Result<(), SourceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(SourceError::Connection)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
