//! Mattermost to Matrix (Synapse) migration engine.
//!
//! `services` holds the edges: the source database, the destination API,
//! tunnels, configuration and on-disk artifacts. `features::migration` holds
//! the resumable step machine and the pipelines that move data between them.

pub mod features;
pub mod services;

pub use features::migration::{Orchestrator, StepName, StepStatus};
pub use services::config::Config;
pub use services::errors::{MigrationError, MigrationResult};
