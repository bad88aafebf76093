use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use tracing::{field, info_span};

use crate::broadcast::job_progress::JobPhase;
use crate::config::{Config, ErrorPolicy};
use crate::db::JobStore;
use crate::job::{JobId, JobRecord, JobStatus, Stage};
use crate::questions::{JsonQuestionCatalog, QuestionCatalog};
use crate::sanitize;
use crate::scoring::{ChatCompletionsEngine, ScoringEngine, ScoringRequest};
use crate::transcription::{
    SharedTranscriber, TranscriptionEngine, TranscriptionError, WhisperApiEngine,
};

use super::config::PipelineConfig;
use super::error::PipelineError;
use super::progress::{NoopProgress, ProgressEvent, ProgressReporter};

/// How a job ended when no error escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Both stages ran and the record is `checked`.
    Checked,
    /// Nothing to do: the record is missing or already failed.
    Skipped,
    /// A stage failed and the error was swallowed.
    Abandoned,
}

/// Processes one job id taken off the queue.
pub trait JobHandler: Send + Sync {
    fn handle(&self, job_id: JobId) -> Result<JobOutcome, PipelineError>;
}

impl<F> JobHandler for F
where
    F: Fn(JobId) -> Result<JobOutcome, PipelineError> + Send + Sync,
{
    fn handle(&self, job_id: JobId) -> Result<JobOutcome, PipelineError> {
        self(job_id)
    }
}

/// Load, transcribe, persist, score, persist.
pub struct JobPipeline {
    store: Arc<dyn JobStore>,
    transcriber: Arc<dyn TranscriptionEngine>,
    scorer: Arc<dyn ScoringEngine>,
    catalog: Arc<dyn QuestionCatalog>,
    progress: Arc<dyn ProgressReporter>,
    config: PipelineConfig,
}

impl JobPipeline {
    pub fn new(
        store: Arc<dyn JobStore>,
        transcriber: Arc<dyn TranscriptionEngine>,
        scorer: Arc<dyn ScoringEngine>,
        catalog: Arc<dyn QuestionCatalog>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            transcriber,
            scorer,
            catalog,
            progress: Arc::new(NoopProgress),
            config,
        }
    }

    /// Production constructor. The transcription engine is created lazily on
    /// the first job and shared by every worker.
    pub fn from_config(config: &Config, store: Arc<dyn JobStore>) -> crate::Result<Self> {
        // Fail fast on a misconfigured key source; the factory resolves it again.
        config.transcription.resolve_api_key()?;
        let transcription = config.transcription.clone();
        let transcriber = SharedTranscriber::new(move || {
            let key = transcription
                .resolve_api_key()
                .map_err(|e| TranscriptionError::Init(e.to_string()))?;
            let engine = WhisperApiEngine::new(&transcription, key)?;
            Ok(Arc::new(engine) as Arc<dyn TranscriptionEngine>)
        });

        let scorer = ChatCompletionsEngine::new(&config.scoring, config.scoring.resolve_api_key()?)?;
        let catalog = JsonQuestionCatalog::new(&config.questions_directory);

        Ok(Self::new(
            store,
            Arc::new(transcriber),
            Arc::new(scorer),
            Arc::new(catalog),
            PipelineConfig::from_config(config),
        ))
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.config.error_policy
    }

    /// Runs both stages for one job.
    ///
    /// A missing or already failed record is skipped without any store write.
    pub fn process_job(&self, job_id: JobId) -> Result<JobOutcome, PipelineError> {
        let job_span = info_span!(
            "job",
            job_id = %job_id,
            language = field::Empty,
            filename = field::Empty,
        );
        let _job_span = job_span.enter();

        let record = match self.store.read_by_id(job_id) {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!("Job record {} not found, skipping", job_id);
                return Ok(JobOutcome::Skipped);
            }
            Err(e) => return self.fail(job_id, None, Stage::Transcription, e.into()),
        };

        job_span.record("language", record.language.as_str());
        job_span.record(
            "filename",
            sanitize::redact_path(&record.file_path).as_str(),
        );

        if record.status.is_failed() {
            info!("Job {} is already failed ({}), skipping", job_id, record.status);
            return Ok(JobOutcome::Skipped);
        }

        let transcribed = match self.transcription_stage(&record) {
            Ok(stored) => stored,
            Err(e) => return self.fail(job_id, Some(&record), Stage::Transcription, e),
        };

        match self.scoring_stage(&transcribed) {
            Ok(_) => {
                info!("Job {} checked", job_id);
                Ok(JobOutcome::Checked)
            }
            Err(e) => self.fail(job_id, Some(&transcribed), Stage::Scoring, e),
        }
    }

    fn transcription_stage(&self, record: &JobRecord) -> Result<JobRecord, PipelineError> {
        let _step = info_span!("transcription").entered();
        self.progress.report(
            record.id,
            ProgressEvent::Phase {
                phase: JobPhase::Transcribing,
                message: "Transcribing audio...".to_string(),
            },
        );

        let transcript = self
            .transcriber
            .transcribe(&record.file_path, &record.language)?;
        debug!(
            "Job {} transcript: {}",
            record.id,
            sanitize::preview(&transcript, 80)
        );

        let stored = self
            .store
            .update_by_id(record.id, &record.transcribed(transcript, Utc::now()))?;

        self.progress.report(
            record.id,
            ProgressEvent::Phase {
                phase: JobPhase::Transcribed,
                message: "Transcript stored".to_string(),
            },
        );
        Ok(stored)
    }

    fn scoring_stage(&self, record: &JobRecord) -> Result<JobRecord, PipelineError> {
        let _step = info_span!("scoring").entered();

        let question = self
            .catalog
            .question_text(&record.language, record.question_id)?
            .ok_or_else(|| PipelineError::QuestionNotFound {
                language: record.language.clone(),
                question_id: record.question_id,
            })?;

        self.progress.report(
            record.id,
            ProgressEvent::Phase {
                phase: JobPhase::Scoring,
                message: "Scoring transcript...".to_string(),
            },
        );

        let request = ScoringRequest {
            language: record.language.clone(),
            transcript: record.transcript.clone().unwrap_or_default(),
            question,
        };
        let assessment = self.scorer.assess(&request)?;
        let (level, overall_score) = (assessment.level, assessment.overall_score);

        let stored = self
            .store
            .update_by_id(record.id, &record.checked(assessment, Utc::now()))?;

        self.progress.report(
            record.id,
            ProgressEvent::Checked {
                level,
                overall_score,
            },
        );
        Ok(stored)
    }

    /// Applies the error policy to a stage failure.
    ///
    /// `record` is the latest stored image of the job, if one was loaded.
    fn fail(
        &self,
        job_id: JobId,
        record: Option<&JobRecord>,
        stage: Stage,
        error: PipelineError,
    ) -> Result<JobOutcome, PipelineError> {
        self.progress.report(
            job_id,
            ProgressEvent::Failed {
                error: error.to_string(),
            },
        );

        match self.config.error_policy {
            ErrorPolicy::Swallow => {
                error!("Job {} failed during {}: {}", job_id, stage, error);
                Ok(JobOutcome::Abandoned)
            }
            ErrorPolicy::Propagate => {
                if error.is_transient() {
                    warn!(
                        "Job {} hit a transient error during {}: {}",
                        job_id, stage, error
                    );
                } else if let Some(record) = record {
                    error!("Job {} failed permanently during {}: {}", job_id, stage, error);
                    self.mark_failed(record, stage, &error);
                }
                Err(error)
            }
        }
    }

    fn mark_failed(&self, record: &JobRecord, stage: Stage, error: &PipelineError) {
        let failed = record.failed(stage, error.to_string(), Utc::now());
        if !record.status.can_advance_to(&failed.status) {
            debug!(
                "Job {} stays {} after a {} failure",
                record.id, record.status, stage
            );
            return;
        }

        if let Err(e) = self.store.update_by_id(record.id, &failed) {
            error!("Failed to mark job {} as failed: {}", record.id, e);
        }
    }
}

impl JobHandler for JobPipeline {
    fn handle(&self, job_id: JobId) -> Result<JobOutcome, PipelineError> {
        self.process_job(job_id)
    }
}

/// True for records the pipeline will still act on.
pub fn is_pending(status: &JobStatus) -> bool {
    matches!(status, JobStatus::Saved | JobStatus::Transcribed)
}
