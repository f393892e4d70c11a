//! Progress reporting for long-running analyses.

use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

pub const MSG_IN_PROGRESS: &str = "Analysis in progress. Please wait.";
pub const MSG_LOADED: &str = "Analysis loaded.";
pub const MSG_SAVED: &str = "Analysis completed and saved.";
pub const MSG_UNSAVED: &str = "Analysis completed but could not be saved.";

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressStatus {
    Started,
    Analyzing,
    /// The ply was recorded without an evaluation
    Degraded { reason: String },
    Loaded,
    Saved,
    Unsaved,
    Failed { reason: String },
}

/// One progress notification. `fraction` is in [0, 1] and never decreases
/// within a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub fraction: f32,
    pub ply: Option<usize>,
    pub status: ProgressStatus,
}

impl Progress {
    pub fn new(fraction: f32, status: ProgressStatus) -> Self {
        Self {
            fraction: fraction.clamp(0.0, 1.0),
            ply: None,
            status,
        }
    }

    pub fn at_ply(ply: usize, total: usize, status: ProgressStatus) -> Self {
        let fraction = if total == 0 { 1.0 } else { ply as f32 / total as f32 };
        Self {
            ply: Some(ply),
            ..Self::new(fraction, status)
        }
    }

    pub fn message(&self) -> String {
        match &self.status {
            ProgressStatus::Started | ProgressStatus::Analyzing => MSG_IN_PROGRESS.to_string(),
            ProgressStatus::Degraded { reason } => match self.ply {
                Some(ply) => format!("Ply {ply} has no evaluation: {reason}"),
                None => format!("Evaluation missing: {reason}"),
            },
            ProgressStatus::Loaded => MSG_LOADED.to_string(),
            ProgressStatus::Saved => MSG_SAVED.to_string(),
            ProgressStatus::Unsaved => MSG_UNSAVED.to_string(),
            ProgressStatus::Failed { reason } => format!("Analysis failed: {reason}"),
        }
    }
}

/// Receives progress notifications from the pipeline.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: Progress);
}

/// Discards all notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: Progress) {}
}

impl<F> ProgressSink for F
where
    F: Fn(Progress) + Send + Sync,
{
    fn report(&self, progress: Progress) {
        self(progress)
    }
}

/// Writes notifications to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, progress: Progress) {
        let percent = (progress.fraction * 100.0).round() as u32;
        match progress.status {
            ProgressStatus::Degraded { .. } | ProgressStatus::Failed { .. } | ProgressStatus::Unsaved => {
                warn!(percent, ply = ?progress.ply, "{}", progress.message())
            }
            ProgressStatus::Analyzing => {}
            _ => info!(percent, "{}", progress.message()),
        }
    }
}

/// Forwards notifications over a channel. A closed receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelProgress(pub UnboundedSender<Progress>);

impl ProgressSink for ChannelProgress {
    fn report(&self, progress: Progress) {
        let _ = self.0.send(progress);
    }
}
