use crate::broadcast::job_progress::{JobPhase, JobProgressBroadcaster, JobProgressEvent};
use crate::job::{JobId, ProficiencyLevel};

/// Events emitted by the pipeline while a job moves through its stages.
/// Transcripts are never included.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Phase {
        phase: JobPhase,
        message: String,
    },
    Checked {
        level: ProficiencyLevel,
        overall_score: f64,
    },
    Failed {
        error: String,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, job_id: JobId, event: ProgressEvent);
}

/// No-op reporter for tests and headless runs.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _job_id: JobId, _event: ProgressEvent) {}
}

/// Forwards pipeline events to a [`JobProgressBroadcaster`].
pub struct BroadcastProgress {
    broadcaster: JobProgressBroadcaster,
}

impl BroadcastProgress {
    pub fn new(broadcaster: JobProgressBroadcaster) -> Self {
        Self { broadcaster }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, job_id: JobId, event: ProgressEvent) {
        let event = match event {
            ProgressEvent::Phase { phase, message } => {
                JobProgressEvent::new(job_id, phase, &message)
            }
            ProgressEvent::Checked {
                level,
                overall_score,
            } => JobProgressEvent::checked(job_id, level, overall_score),
            ProgressEvent::Failed { error } => JobProgressEvent::failed(job_id, &error),
        };
        self.broadcaster.send(event);
    }
}
