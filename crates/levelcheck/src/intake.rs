//! Bringing an audio answer into the pipeline: stage the file, create the
//! `Saved` record, publish its id.

use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{DatabaseError, JobStore};
use crate::job::{JobId, NewJobRecord};
use crate::queue::{publish_job, QueueConnector};
use crate::sanitize::redact_path;

/// Extensions accepted as uploads.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "wav", "mp3", "aac", "flac", "alac", "ogg", "wma", "aiff", "m4a", "m4b", "m4p", "mid",
    "midi", "mpc", "opus", "oga", "mp4",
];

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Not an audio file: {0}")]
    NotAudio(String),

    #[error("Audio file not found: {0}")]
    NotFound(PathBuf),

    #[error("Language code must not be empty")]
    EmptyLanguage,

    #[error("Failed to stage upload to {path}: {source}")]
    Stage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),
}

/// An answer to record.
#[derive(Debug, Clone)]
pub struct Submission {
    pub language: String,
    pub question_id: i64,
    pub audio: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub job_id: JobId,
    /// False when the record exists but its id never reached the queue.
    pub published: bool,
}

pub fn is_audio_file(path: &Path) -> bool {
    let by_extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false);

    by_extension
        || mime_guess::from_path(path)
            .first()
            .map(|m| m.type_() == mime_guess::mime::AUDIO)
            .unwrap_or(false)
}

/// Copies `source` into `upload_dir` under a fresh UUID name that keeps the
/// original extension. Returns the stored file name and full path.
pub fn stage_upload(source: &Path, upload_dir: &Path) -> Result<(String, PathBuf), IntakeError> {
    if !source.is_file() {
        return Err(IntakeError::NotFound(source.to_path_buf()));
    }
    if !is_audio_file(source) {
        return Err(IntakeError::NotAudio(redact_path(source)));
    }

    fs::create_dir_all(upload_dir).map_err(|e| IntakeError::Stage {
        path: upload_dir.to_path_buf(),
        source: e,
    })?;

    let file_name = match source.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext.to_ascii_lowercase()),
        None => Uuid::new_v4().to_string(),
    };
    let target = upload_dir.join(&file_name);

    fs::copy(source, &target).map_err(|e| IntakeError::Stage {
        path: target.clone(),
        source: e,
    })?;

    Ok((file_name, target))
}

/// Stages the audio, creates the `Saved` record and publishes its id.
///
/// Creating the record and publishing are not atomic. A failed publish is
/// logged and reported through [`Receipt::published`]; the record stays
/// `Saved` until its id is published again.
pub fn submit(
    store: &dyn JobStore,
    connector: &dyn QueueConnector,
    queue: &str,
    upload_dir: &Path,
    submission: &Submission,
) -> Result<Receipt, IntakeError> {
    let language = submission.language.trim();
    if language.is_empty() {
        return Err(IntakeError::EmptyLanguage);
    }

    let (file_name, file_path) = stage_upload(&submission.audio, upload_dir)?;

    let job_id = store.create(&NewJobRecord {
        language: language.to_string(),
        question_id: submission.question_id,
        file_name: file_name.clone(),
        file_path,
    })?;
    info!("Created job {} for {}", job_id, file_name);

    let published = match publish_job(connector, queue, job_id) {
        Ok(()) => true,
        Err(e) => {
            error!(
                "Job {} was saved but not published to '{}': {}",
                job_id, queue, e
            );
            false
        }
    };

    Ok(Receipt { job_id, published })
}
