use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::parse::parse_assessment;
use super::prompt::build_prompt;
use super::{ScoringEngine, ScoringError, ScoringRequest};
use crate::config::ScoringConfig;
use crate::job::Assessment;
use crate::sanitize::preview;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Scoring through an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionsEngine {
    client: reqwest::blocking::Client,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChatCompletionsEngine {
    pub fn new(config: &ScoringConfig, api_key: Option<SecretString>) -> Result<Self, ScoringError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ScoringError::Init(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn complete(&self, prompt: &str) -> Result<String, ScoringError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            n: 1,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ScoringError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().map_err(classify_request_error)?;
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| ScoringError::MalformedResponse(format!("completion envelope: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ScoringError::MalformedResponse("completion has no content".into()))
    }
}

impl ScoringEngine for ChatCompletionsEngine {
    fn assess(&self, request: &ScoringRequest) -> Result<Assessment, ScoringError> {
        let prompt = build_prompt(request);
        tracing::debug!(model = %self.model, language = %request.language, "Requesting assessment");

        let completion = self.complete(&prompt)?;
        log::debug!("Scoring completion: {}", preview(&completion, 200));

        let assessment = parse_assessment(&completion)?;
        tracing::info!(
            level = %assessment.level,
            overall = assessment.overall_score,
            "Assessment completed"
        );
        Ok(assessment)
    }
}

fn classify_request_error(e: reqwest::Error) -> ScoringError {
    if e.is_timeout() {
        ScoringError::Timeout
    } else {
        ScoringError::Unavailable(e.to_string())
    }
}
