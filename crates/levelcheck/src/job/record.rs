use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::assessment::Assessment;
use super::status::{JobStatus, Stage};

/// Store-assigned identifier of a job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(i64);

impl JobId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parses the decimal job id carried in a queue message body.
impl FromStr for JobId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(JobId)
            .map_err(|e| format!("Invalid job id '{}': {}", s, e))
    }
}

/// Fields supplied when an uploaded answer is first recorded.
#[derive(Debug, Clone)]
pub struct NewJobRecord {
    pub language: String,
    pub question_id: i64,
    pub file_name: String,
    pub file_path: PathBuf,
}

/// One submitted audio answer and everything the pipeline learned about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub language: String,
    pub question_id: i64,
    pub file_name: String,
    pub file_path: PathBuf,
    pub status: JobStatus,
    pub transcript: Option<String>,
    pub assessment: Option<Assessment>,
    /// Incremented by the store on every write.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Record after a successful transcription stage.
    ///
    /// A record that is already checked stays checked so that re-running a
    /// redelivered job never moves its status backward.
    pub fn transcribed(&self, transcript: String, now: DateTime<Utc>) -> Self {
        let status = match self.status {
            JobStatus::Checked => JobStatus::Checked,
            _ => JobStatus::Transcribed,
        };
        Self {
            status,
            transcript: Some(transcript),
            updated_at: now,
            ..self.clone()
        }
    }

    /// Record after a successful scoring stage.
    pub fn checked(&self, assessment: Assessment, now: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Checked,
            assessment: Some(assessment),
            updated_at: now,
            ..self.clone()
        }
    }

    /// Record parked in the terminal failed state.
    pub fn failed(&self, stage: Stage, reason: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Failed {
                stage,
                reason: reason.into(),
            },
            updated_at: now,
            ..self.clone()
        }
    }

    /// Checks the status/field consistency rules every stored record obeys.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.updated_at < self.created_at {
            return Err(format!(
                "updated_at {} precedes created_at {}",
                self.updated_at, self.created_at
            ));
        }

        match &self.status {
            JobStatus::Saved => {
                if self.transcript.is_some() {
                    return Err("saved record has a transcript".to_string());
                }
                if self.assessment.is_some() {
                    return Err("saved record has an assessment".to_string());
                }
            }
            JobStatus::Transcribed => {
                if self.transcript.is_none() {
                    return Err("transcribed record has no transcript".to_string());
                }
                if self.assessment.is_some() {
                    return Err("transcribed record has an assessment".to_string());
                }
            }
            JobStatus::Checked => {
                if self.transcript.is_none() {
                    return Err("checked record has no transcript".to_string());
                }
                if self.assessment.is_none() {
                    return Err("checked record has no assessment".to_string());
                }
            }
            JobStatus::Failed { .. } => {
                if self.assessment.is_some() {
                    return Err("failed record has an assessment".to_string());
                }
            }
        }

        Ok(())
    }
}
