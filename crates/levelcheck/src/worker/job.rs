use std::time::Duration;

use crate::job::JobId;
use crate::pipeline::{JobOutcome, PipelineError};

/// A job handed to the pool. `ticket` is opaque to workers and comes back
/// unchanged in the [`JobResult`] so the caller can match it to its delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    pub ticket: u64,
    pub job_id: JobId,
}

impl Job {
    pub fn new(ticket: u64, job_id: JobId) -> Self {
        Self { ticket, job_id }
    }
}

#[derive(Debug)]
pub struct JobResult {
    pub ticket: u64,
    pub job_id: JobId,
    pub outcome: Result<JobOutcome, PipelineError>,
    pub elapsed: Duration,
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}
