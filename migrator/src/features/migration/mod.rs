pub mod lock;
pub mod mapping;
pub mod orchestrator;
pub mod pipelines;
pub mod progress;
pub mod resume;
pub mod state;

pub use lock::StateLock;
pub use mapping::{Mapping, MappingStats, MergeConflict, MergeOutcome};
pub use orchestrator::{
    AssetImportReport, MembershipImportReport, Orchestrator, SourceDiagnostics,
};
pub use progress::*;
pub use resume::{next_step, MappingSource};
pub use state::*;
