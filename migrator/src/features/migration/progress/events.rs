//! Migration progress events

use std::fmt;

use crate::features::migration::state::StepName;

/// The unit of work a step is currently iterating over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Users,
    Teams,
    Channels,
    Spaces,
    Rooms,
    Linking,
    TeamMembers,
    ChannelMembers,
    TeamMemberships,
    ChannelMemberships,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Users => "users",
            Stage::Teams => "teams",
            Stage::Channels => "channels",
            Stage::Spaces => "spaces",
            Stage::Rooms => "rooms",
            Stage::Linking => "linking",
            Stage::TeamMembers => "team_members",
            Stage::ChannelMembers => "channel_members",
            Stage::TeamMemberships => "team_memberships",
            Stage::ChannelMemberships => "channel_memberships",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted while a step runs. Sent one way, from the engine to
/// whatever renders them.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    StepStarted {
        step: StepName,
    },
    StageStarted {
        step: StepName,
        stage: Stage,
        total: u64,
    },
    Item {
        step: StepName,
        stage: Stage,
        processed: u64,
        total: u64,
        item: Option<String>,
    },
    Warning {
        step: StepName,
        message: String,
    },
    StepCompleted {
        step: StepName,
        output_file: Option<String>,
    },
    StepFailed {
        step: StepName,
        error: String,
    },
}

impl ProgressEvent {
    pub fn step(&self) -> StepName {
        match self {
            ProgressEvent::StepStarted { step }
            | ProgressEvent::StageStarted { step, .. }
            | ProgressEvent::Item { step, .. }
            | ProgressEvent::Warning { step, .. }
            | ProgressEvent::StepCompleted { step, .. }
            | ProgressEvent::StepFailed { step, .. } => *step,
        }
    }
}
