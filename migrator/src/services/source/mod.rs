//! Read-only access to the Mattermost database.
//!
//! - **models**: exported record shapes and artifact documents
//! - **provider**: the `SourceProvider` seam used by the export pipelines
//! - **postgres**: the PostgreSQL implementation
//! - **config_reader**: database credential discovery from Mattermost's `config.json`

pub mod config_reader;
pub mod models;
pub mod postgres;
pub mod provider;

pub use config_reader::{DatabaseCredentials, MattermostConfigFile, DEFAULT_CONFIG_PATHS};
pub use models::*;
pub use postgres::PostgresSource;
pub use provider::{SourceError, SourceProvider};
