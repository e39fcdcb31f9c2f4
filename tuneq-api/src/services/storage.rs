//! Durable audio storage
//!
//! Uploads the fetched file to a Telegram chat through the Bot API and turns
//! the returned `file_id` into the retrieval URL recorded on the job.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tuneq_common::config::{resolve_secret, StorageConfig};

const USER_AGENT: &str = concat!("tuneq/", env!("CARGO_PKG_VERSION"));

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Upload rejected: {0}")]
    Rejected(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Local file → retrieval URL
#[async_trait]
pub trait Storage: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<String, StorageError>;
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    #[serde(default)]
    audio: Option<TelegramFile>,
    /// Files Telegram cannot parse as audio come back as documents
    #[serde(default)]
    document: Option<TelegramFile>,
}

#[derive(Debug, Deserialize)]
struct TelegramFile {
    file_id: String,
}

/// Pull the stored file id out of a `sendAudio` response
fn extract_file_id(response: TelegramResponse) -> Result<String, StorageError> {
    if !response.ok {
        return Err(StorageError::Rejected(
            response
                .description
                .unwrap_or_else(|| "no description".to_string()),
        ));
    }

    response
        .result
        .and_then(|message| message.audio.or(message.document))
        .map(|file| file.file_id)
        .ok_or_else(|| StorageError::ParseError("response carries no audio file_id".to_string()))
}

/// Telegram Bot API storage
pub struct TelegramStorage {
    http_client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
    file_url_base: String,
}

impl TelegramStorage {
    pub fn new(
        api_base: String,
        bot_token: String,
        chat_id: String,
        file_url_base: String,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
            file_url_base,
        })
    }

    /// Build from TOML settings; `BOT_TOKEN` and `UPLOAD_CHAT_ID` take priority
    pub fn from_config(config: &StorageConfig, timeout: Duration) -> tuneq_common::Result<Self> {
        let bot_token = resolve_secret("Telegram bot token", "BOT_TOKEN", config.bot_token.as_ref())?;
        let chat_id = resolve_secret("Telegram upload chat id", "UPLOAD_CHAT_ID", config.chat_id.as_ref())?;
        Self::new(
            config.api_base.clone(),
            bot_token,
            chat_id,
            config.file_url_base.clone(),
            timeout,
        )
        .map_err(|e| tuneq_common::Error::Config(e.to_string()))
    }

    fn send_audio_url(&self) -> String {
        format!("{}/bot{}/sendAudio", self.api_base, self.bot_token)
    }

    /// Retrieval URL for a stored file id
    pub fn file_url(&self, file_id: &str) -> String {
        format!("{}{}", self.file_url_base, file_id)
    }
}

#[async_trait]
impl Storage for TelegramStorage {
    async fn upload(&self, path: &Path) -> Result<String, StorageError> {
        let bytes = tokio::fs::read(path).await?;
        let size = bytes.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.mp3".to_string());

        let audio = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/mpeg")
            .map_err(|e| StorageError::NetworkError(e.to_string()))?;
        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .part("audio", audio);

        tracing::debug!(path = %path.display(), bytes = size, "Uploading audio");

        let response = self
            .http_client
            .post(self.send_audio_url())
            .multipart(form)
            .send()
            .await
            // reqwest errors embed the request URL, which carries the bot token
            .map_err(|e| StorageError::NetworkError(e.without_url().to_string()))?;

        let status = response.status();
        let body: TelegramResponse = match response.json().await {
            Ok(body) => body,
            Err(e) if status.is_success() => {
                return Err(StorageError::ParseError(e.without_url().to_string()))
            }
            Err(_) => return Err(StorageError::ApiError(status.as_u16(), status.to_string())),
        };

        if !status.is_success() && body.ok {
            return Err(StorageError::ApiError(status.as_u16(), status.to_string()));
        }

        let file_id = extract_file_id(body)?;
        tracing::info!(path = %path.display(), file_id = %file_id, "Audio stored");
        Ok(self.file_url(&file_id))
    }
}
