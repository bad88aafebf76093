use std::path::Path;
use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{TranscriptionEngine, TranscriptionError};
use crate::config::TranscriptionConfig;
use crate::sanitize::redact_path;

/// Language codes the Whisper model family accepts as a hint.
const WHISPER_LANGUAGES: &[&str] = &[
    "af", "am", "ar", "as", "az", "ba", "be", "bg", "bn", "bo", "br", "bs", "ca", "cs", "cy", "da",
    "de", "el", "en", "es", "et", "eu", "fa", "fi", "fo", "fr", "gl", "gu", "ha", "haw", "he",
    "hi", "hr", "ht", "hu", "hy", "id", "is", "it", "ja", "jw", "ka", "kk", "km", "kn", "ko", "la",
    "lb", "ln", "lo", "lt", "lv", "mg", "mi", "mk", "ml", "mn", "mr", "ms", "mt", "my", "ne", "nl",
    "nn", "no", "oc", "pa", "pl", "ps", "pt", "ro", "ru", "sa", "sd", "si", "sk", "sl", "sn", "so",
    "sq", "sr", "su", "sv", "sw", "ta", "te", "tg", "th", "tk", "tl", "tr", "tt", "uk", "ur", "uz",
    "vi", "yi", "yo", "yue", "zh",
];

pub fn is_supported_language(language: &str) -> bool {
    WHISPER_LANGUAGES.contains(&language)
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Client for an OpenAI-compatible `/audio/transcriptions` endpoint.
pub struct WhisperApiEngine {
    client: reqwest::blocking::Client,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
}

impl WhisperApiEngine {
    pub fn new(
        config: &TranscriptionConfig,
        api_key: Option<SecretString>,
    ) -> Result<Self, TranscriptionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TranscriptionError::Init(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn build_form(&self, audio: &Path, language: &str) -> Result<Form, TranscriptionError> {
        let data = std::fs::read(audio).map_err(|e| TranscriptionError::UnreadableFile {
            path: audio.to_path_buf(),
            source: e,
        })?;

        let mime = mime_guess::from_path(audio).first_or_octet_stream();
        let file_part = Part::bytes(data)
            .file_name(redact_path(audio))
            .mime_str(mime.essence_str())
            .map_err(|e| TranscriptionError::InvalidResponse(format!("mime: {}", e)))?;

        Ok(Form::new()
            .text("model", self.model.clone())
            .text("language", language.to_string())
            .text("response_format", "json")
            .part("file", file_part))
    }
}

impl TranscriptionEngine for WhisperApiEngine {
    fn transcribe(&self, audio: &Path, language: &str) -> Result<String, TranscriptionError> {
        if !is_supported_language(language) {
            return Err(TranscriptionError::UnsupportedLanguage(language.to_string()));
        }

        let form = self.build_form(audio, language)?;
        let url = format!("{}/audio/transcriptions", self.base_url);

        tracing::debug!(model = %self.model, file = %redact_path(audio), "Sending audio to transcription engine");

        let mut request = self.client.post(&url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(TranscriptionError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().map_err(classify_request_error)?;
        let parsed: TranscriptionResponse = serde_json::from_str(&body)
            .map_err(|e| TranscriptionError::InvalidResponse(e.to_string()))?;

        let transcript = parsed.text.trim().to_string();
        tracing::info!(chars = transcript.len(), "Transcription completed");

        Ok(transcript)
    }
}

fn classify_request_error(e: reqwest::Error) -> TranscriptionError {
    if e.is_timeout() {
        TranscriptionError::Timeout
    } else {
        TranscriptionError::Unavailable(e.to_string())
    }
}
