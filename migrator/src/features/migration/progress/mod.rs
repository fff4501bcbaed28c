//! Progress reporting
//!
//! The engine never owns a global logger or UI handle. Callers inject a
//! [`ProgressReporter`]; events flow one way, from the running step outwards.

pub mod events;
pub mod tracker;

pub use events::*;
pub use tracker::ProgressTracker;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingReporter;

impl ProgressReporter for LoggingReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::StepStarted { step } => {
                info!("[Progress] Step started: {}", step);
            }
            ProgressEvent::StageStarted { step, stage, total } => {
                info!("[Progress] {} / {}: {} items", step, stage, total);
            }
            ProgressEvent::Item {
                step,
                stage,
                processed,
                total,
                item,
            } => match item {
                Some(item) => debug!(
                    "[Progress] {} / {}: {}/{} ({})",
                    step, stage, processed, total, item
                ),
                None => debug!("[Progress] {} / {}: {}/{}", step, stage, processed, total),
            },
            ProgressEvent::Warning { step, message } => {
                warn!("[Progress] {}: {}", step, message);
            }
            ProgressEvent::StepCompleted { step, output_file } => match output_file {
                Some(file) => info!("[Progress] Step completed: {} -> {}", step, file),
                None => info!("[Progress] Step completed: {}", step),
            },
            ProgressEvent::StepFailed { step, error: message } => {
                error!("[Progress] Step failed: {} - {}", step, message);
            }
        }
    }
}

/// Sends events over a channel to a renderer on another task
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, event: ProgressEvent) {
        // A closed receiver only means nobody is watching anymore
        let _ = self.sender.send(event);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

/// Fans each event out to several reporters
#[derive(Default)]
pub struct CompositeReporter {
    reporters: Vec<Box<dyn ProgressReporter>>,
}

impl CompositeReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R: ProgressReporter + 'static>(mut self, reporter: R) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }
}

impl ProgressReporter for CompositeReporter {
    fn report(&self, event: ProgressEvent) {
        for reporter in &self.reporters {
            reporter.report(event.clone());
        }
    }
}
