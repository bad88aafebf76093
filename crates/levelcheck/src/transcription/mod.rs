//! Speech-to-text stage collaborator.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod shared;
pub mod whisper_api;

pub use shared::SharedTranscriber;
pub use whisper_api::WhisperApiEngine;

#[derive(Error, Debug)]
pub enum TranscriptionError {
    #[error("Audio file '{path}' is unreadable: {source}")]
    UnreadableFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported language '{0}'")]
    UnsupportedLanguage(String),

    #[error("Transcription engine unavailable: {0}")]
    Unavailable(String),

    #[error("Transcription request timed out")]
    Timeout,

    #[error("Transcription engine returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid transcription response: {0}")]
    InvalidResponse(String),

    #[error("Failed to initialize transcription engine: {0}")]
    Init(String),

    #[error("Transcription engine lock poisoned")]
    LockPoisoned,
}

impl TranscriptionError {
    /// Whether the same request may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            TranscriptionError::Unavailable(_)
            | TranscriptionError::Timeout
            | TranscriptionError::Init(_)
            | TranscriptionError::LockPoisoned => true,
            TranscriptionError::Rejected { status, .. } => is_retryable_status(*status),
            TranscriptionError::UnreadableFile { .. }
            | TranscriptionError::UnsupportedLanguage(_)
            | TranscriptionError::InvalidResponse(_) => false,
        }
    }
}

/// 5xx and 429 are worth retrying, any other status is a rejection.
pub(crate) fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Converts an audio file into transcript text.
///
/// Calls block for the full duration of the transcription.
pub trait TranscriptionEngine: Send + Sync {
    fn transcribe(&self, audio: &Path, language: &str) -> Result<String, TranscriptionError>;
}

impl<T: TranscriptionEngine + ?Sized> TranscriptionEngine for std::sync::Arc<T> {
    fn transcribe(&self, audio: &Path, language: &str) -> Result<String, TranscriptionError> {
        (**self).transcribe(audio, language)
    }
}

impl<T: TranscriptionEngine + ?Sized> TranscriptionEngine for Box<T> {
    fn transcribe(&self, audio: &Path, language: &str) -> Result<String, TranscriptionError> {
        (**self).transcribe(audio, language)
    }
}
