//! Process-wide transcription engine, initialized on first use.

use std::path::Path;
use std::sync::{Arc, Mutex};

use log::info;

use super::{TranscriptionEngine, TranscriptionError};

type EngineFactory =
    Box<dyn Fn() -> Result<Arc<dyn TranscriptionEngine>, TranscriptionError> + Send + Sync>;

/// Shares one engine instance across all workers.
///
/// The factory runs on the first `transcribe` call. A failed initialization
/// is not cached, so the next call tries again. The lock is only held while
/// the engine is created, never during a transcription.
pub struct SharedTranscriber {
    factory: EngineFactory,
    engine: Mutex<Option<Arc<dyn TranscriptionEngine>>>,
}

impl SharedTranscriber {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn TranscriptionEngine>, TranscriptionError> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            engine: Mutex::new(None),
        }
    }

    /// Wraps an engine that is already initialized.
    pub fn from_engine(engine: Arc<dyn TranscriptionEngine>) -> Self {
        let ready = Arc::clone(&engine);
        Self {
            factory: Box::new(move || Ok(Arc::clone(&ready))),
            engine: Mutex::new(Some(engine)),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    fn get_or_create(&self) -> Result<Arc<dyn TranscriptionEngine>, TranscriptionError> {
        let mut guard = self
            .engine
            .lock()
            .map_err(|_| TranscriptionError::LockPoisoned)?;
        if let Some(engine) = guard.as_ref() {
            return Ok(Arc::clone(engine));
        }

        info!("Initializing transcription engine...");
        let engine = (self.factory)()?;
        *guard = Some(Arc::clone(&engine));
        info!("Transcription engine initialized");
        Ok(engine)
    }
}

impl TranscriptionEngine for SharedTranscriber {
    fn transcribe(&self, audio: &Path, language: &str) -> Result<String, TranscriptionError> {
        let engine = self.get_or_create()?;
        engine.transcribe(audio, language)
    }
}
