//! Job progress broadcaster for observers of the consumer process.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::job::{JobId, ProficiencyLevel};

/// Phase of job processing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Transcribing,
    Transcribed,
    Scoring,
    Checked,
    Failed,
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPhase::Transcribing => write!(f, "Transcribing"),
            JobPhase::Transcribed => write!(f, "Transcribed"),
            JobPhase::Scoring => write!(f, "Scoring"),
            JobPhase::Checked => write!(f, "Checked"),
            JobPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Progress event for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: JobId,
    pub phase: JobPhase,
    /// Human-readable message describing current activity.
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Set when the job reaches `Checked`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<ProficiencyLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<f64>,
    /// Set on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobProgressEvent {
    pub fn new(job_id: JobId, phase: JobPhase, message: &str) -> Self {
        Self {
            job_id,
            phase,
            message: message.to_string(),
            timestamp: Utc::now(),
            level: None,
            overall_score: None,
            error: None,
        }
    }

    pub fn checked(job_id: JobId, level: ProficiencyLevel, overall_score: f64) -> Self {
        Self {
            level: Some(level),
            overall_score: Some(overall_score),
            ..Self::new(job_id, JobPhase::Checked, "Assessment stored")
        }
    }

    pub fn failed(job_id: JobId, error: &str) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(job_id, JobPhase::Failed, "Processing failed")
        }
    }
}

/// Broadcasts job progress events to any number of subscribers.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event. Having no subscribers is not an error.
    pub fn send(&self, event: JobProgressEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
