//! Query translation client
//!
//! Turns free-text input ("that song from the titanic") into a search term
//! suitable for the fetcher ("my heart will go on celine dion").

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tuneq_common::config::{resolve_secret, TranslatorConfig};

const USER_AGENT: &str = concat!("tuneq/", env!("CARGO_PKG_VERSION"));

/// Translation errors
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Empty search term returned")]
    EmptyResult,
}

/// Query → search term
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String, TranslateError>;
}

/// Build the prompt sent to the language model
pub fn build_prompt(text: &str) -> String {
    format!(
        "Convert this into best YouTube music search query.\n\
         Only return the query text.\n\
         \n\
         Input: {}\n",
        text
    )
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// Extract the trimmed text of the first candidate
fn extract_term(response: GenerateResponse) -> Result<String, TranslateError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
        .unwrap_or_default();

    let term = text.trim();
    if term.is_empty() {
        return Err(TranslateError::EmptyResult);
    }
    Ok(term.to_string())
}

/// Gemini `generateContent` client
pub struct GeminiTranslator {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiTranslator {
    pub fn new(
        endpoint: String,
        model: String,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, TranslateError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| TranslateError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            api_key,
        })
    }

    /// Build from TOML settings; the API key resolves ENV (`GEMINI_API_KEY`) first
    pub fn from_config(config: &TranslatorConfig) -> tuneq_common::Result<Self> {
        let api_key = resolve_secret("Gemini API key", "GEMINI_API_KEY", config.api_key.as_ref())?;
        Self::new(
            config.endpoint.clone(),
            config.model.clone(),
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
        .map_err(|e| tuneq_common::Error::Config(e.to_string()))
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl Translator for GeminiTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslateError> {
        let prompt = build_prompt(text);
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: &prompt }],
            }],
        };

        tracing::debug!(model = %self.model, "Requesting search term translation");

        let response = self
            .http_client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| TranslateError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TranslateError::ApiError(status.as_u16(), error_text));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::ParseError(e.to_string()))?;

        let term = extract_term(body)?;
        tracing::info!(query = %text, term = %term, "Query translated");
        Ok(term)
    }
}
