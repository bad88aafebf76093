use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Pipeline stage a job can fail in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Transcription,
    Scoring,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Transcription => "transcription",
            Stage::Scoring => "scoring",
        }
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transcription" => Ok(Stage::Transcription),
            "scoring" => Ok(Stage::Scoring),
            _ => Err(format!("Invalid stage: {}", s)),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a job record.
///
/// Progression is `Saved -> Transcribed -> Checked`. `Failed` is terminal and
/// only reachable before a record has been checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Saved,
    Transcribed,
    Checked,
    Failed { stage: Stage, reason: String },
}

impl JobStatus {
    /// Column value stored in `job_records.status`.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Saved => "saved",
            JobStatus::Transcribed => "transcribed",
            JobStatus::Checked => "checked",
            JobStatus::Failed { .. } => "failed",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Saved => 0,
            JobStatus::Transcribed => 1,
            JobStatus::Checked => 2,
            JobStatus::Failed { .. } => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Checked | JobStatus::Failed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, JobStatus::Failed { .. })
    }

    /// Whether a record in this status may be overwritten with `next`.
    ///
    /// Writing the same status again is allowed so that a redelivered job can
    /// re-run its stages. A checked record never becomes failed, and a failed
    /// record accepts no further writes.
    pub fn can_advance_to(&self, next: &JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Failed { .. }, _) => false,
            (JobStatus::Checked, JobStatus::Failed { .. }) => false,
            _ => next.rank() >= self.rank(),
        }
    }

    /// Rebuilds a status from its stored columns.
    pub fn from_columns(
        status: &str,
        failed_stage: Option<&str>,
        failure_reason: Option<&str>,
    ) -> Result<Self, String> {
        match status {
            "saved" => Ok(JobStatus::Saved),
            "transcribed" => Ok(JobStatus::Transcribed),
            "checked" => Ok(JobStatus::Checked),
            "failed" => {
                let stage = failed_stage
                    .ok_or_else(|| "failed status without a stage".to_string())?
                    .parse()?;
                Ok(JobStatus::Failed {
                    stage,
                    reason: failure_reason.unwrap_or_default().to_string(),
                })
            }
            other => Err(format!("Invalid job status: {}", other)),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Failed { stage, reason } => write!(f, "failed ({}): {}", stage, reason),
            other => f.write_str(other.as_str()),
        }
    }
}
