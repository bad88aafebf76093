//! Per-language interview question lookup.
//!
//! Questions live in `questions.<lang>.json` files of the form
//! `[{ "question_id": 1, "question_content": "..." }, ...]`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Invalid language code '{0}'")]
    InvalidLanguage(String),

    #[error("Failed to read question file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse question file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Question catalog lock poisoned")]
    LockPoisoned,
}

impl CatalogError {
    /// Only a poisoned cache lock may clear up on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, CatalogError::LockPoisoned)
    }
}

/// Lookup of question text by language and question id.
pub trait QuestionCatalog: Send + Sync {
    /// `Ok(None)` when the language or the id is unknown.
    fn question_text(&self, language: &str, question_id: i64)
        -> Result<Option<String>, CatalogError>;
}

#[derive(Debug, Deserialize)]
struct QuestionEntry {
    question_id: i64,
    question_content: String,
}

type QuestionMap = Arc<HashMap<i64, String>>;

/// Catalog backed by JSON files in one directory, loaded lazily per language.
pub struct JsonQuestionCatalog {
    directory: PathBuf,
    cache: Mutex<HashMap<String, QuestionMap>>,
}

impl JsonQuestionCatalog {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_for(&self, language: &str) -> Result<PathBuf, CatalogError> {
        let valid = !language.is_empty()
            && language.len() <= 16
            && language
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(CatalogError::InvalidLanguage(language.to_string()));
        }
        Ok(self.directory.join(format!("questions.{}.json", language)))
    }

    fn load(&self, language: &str) -> Result<QuestionMap, CatalogError> {
        {
            let cache = self.cache.lock().map_err(|_| CatalogError::LockPoisoned)?;
            if let Some(map) = cache.get(language) {
                return Ok(Arc::clone(map));
            }
        }

        let path = self.file_for(language)?;
        let map: HashMap<i64, String> = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| CatalogError::ReadFile {
                path: path.clone(),
                source: e,
            })?;
            let entries: Vec<QuestionEntry> =
                serde_json::from_str(&content).map_err(|e| CatalogError::Parse {
                    path: path.clone(),
                    source: e,
                })?;
            log::debug!(
                "Loaded {} questions for language '{}'",
                entries.len(),
                language
            );
            entries
                .into_iter()
                .map(|e| (e.question_id, e.question_content))
                .collect()
        } else {
            log::warn!("No question file for language '{}'", language);
            HashMap::new()
        };

        let map = Arc::new(map);
        let mut cache = self.cache.lock().map_err(|_| CatalogError::LockPoisoned)?;
        cache.insert(language.to_string(), Arc::clone(&map));
        Ok(map)
    }
}

impl QuestionCatalog for JsonQuestionCatalog {
    fn question_text(
        &self,
        language: &str,
        question_id: i64,
    ) -> Result<Option<String>, CatalogError> {
        let map = self.load(language)?;
        Ok(map.get(&question_id).cloned())
    }
}
