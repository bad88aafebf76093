//! Proficiency scoring stage collaborator.

use thiserror::Error;

use crate::job::Assessment;

pub mod chat;
pub mod parse;
pub mod prompt;

pub use chat::ChatCompletionsEngine;

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Scoring engine unavailable: {0}")]
    Unavailable(String),

    #[error("Scoring request timed out")]
    Timeout,

    #[error("Scoring engine returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Malformed assessment: {0}")]
    MalformedResponse(String),

    #[error("Failed to initialize scoring engine: {0}")]
    Init(String),
}

impl ScoringError {
    pub fn is_transient(&self) -> bool {
        match self {
            ScoringError::Unavailable(_) | ScoringError::Timeout | ScoringError::Init(_) => true,
            ScoringError::Rejected { status, .. } => {
                crate::transcription::is_retryable_status(*status)
            }
            ScoringError::MalformedResponse(_) => false,
        }
    }
}

/// Everything the scorer is told about one answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringRequest {
    pub language: String,
    pub transcript: String,
    pub question: String,
}

/// Grades a transcript against the question it answers.
pub trait ScoringEngine: Send + Sync {
    fn assess(&self, request: &ScoringRequest) -> Result<Assessment, ScoringError>;
}

impl<T: ScoringEngine + ?Sized> ScoringEngine for std::sync::Arc<T> {
    fn assess(&self, request: &ScoringRequest) -> Result<Assessment, ScoringError> {
        (**self).assess(request)
    }
}

impl<T: ScoringEngine + ?Sized> ScoringEngine for Box<T> {
    fn assess(&self, request: &ScoringRequest) -> Result<Assessment, ScoringError> {
        (**self).assess(request)
    }
}
