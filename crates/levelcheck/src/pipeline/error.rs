use thiserror::Error;

use crate::db::DatabaseError;
use crate::questions::CatalogError;
use crate::scoring::ScoringError;
use crate::transcription::TranscriptionError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Store operation failed: {0}")]
    Store(#[from] DatabaseError),

    #[error("Transcription failed: {0}")]
    Transcription(#[from] TranscriptionError),

    #[error("Scoring failed: {0}")]
    Scoring(#[from] ScoringError),

    #[error("Question lookup failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error("No question {question_id} for language '{language}'")]
    QuestionNotFound { language: String, question_id: i64 },

    #[error("Undecodable message body: {0}")]
    BadMessage(String),

    #[error("Job handler panicked: {0}")]
    Panicked(String),
}

impl PipelineError {
    /// Transient errors are requeued; everything else is dead-lettered.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Store(e) => e.is_transient(),
            PipelineError::Transcription(e) => e.is_transient(),
            PipelineError::Scoring(e) => e.is_transient(),
            PipelineError::Catalog(e) => e.is_transient(),
            PipelineError::QuestionNotFound { .. }
            | PipelineError::BadMessage(_)
            | PipelineError::Panicked(_) => false,
        }
    }
}
