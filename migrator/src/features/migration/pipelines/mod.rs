//! Export, import, membership and linking pipelines.
//!
//! Records are processed one at a time in source order. Pipelines never touch
//! the state file themselves; progress goes through the [`ProgressTracker`]
//! the orchestrator hands in.
//!
//! [`ProgressTracker`]: crate::features::migration::progress::ProgressTracker

pub mod export;
pub mod import;
pub mod linking;
pub mod memberships;
pub mod stats;

pub use export::{
    export_assets, export_memberships, filter_active_assets, filter_active_memberships,
};
pub use import::{generate_password, import_assets, sanitize_alias, ImportOptions};
pub use linking::link_rooms_to_spaces;
pub use memberships::import_memberships;
pub use stats::*;
