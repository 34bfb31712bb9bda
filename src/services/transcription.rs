use crate::audio::PcmWavBuffer;
use crate::error::{Result, SessionError};
use crate::language::LanguageCode;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Remote speech-to-text contract.
///
/// The buffer is taken by value; one utterance is submitted exactly
/// once and not retained.
#[async_trait]
pub trait TranscriptionClient: Send + Sync {
    async fn transcribe(&self, audio: PcmWavBuffer, language: &LanguageCode) -> Result<String>;
}

/// OpenAI-style `/audio/transcriptions` client.
pub struct HttpTranscriptionClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpTranscriptionClient {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Config {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl TranscriptionClient for HttpTranscriptionClient {
    async fn transcribe(&self, audio: PcmWavBuffer, language: &LanguageCode) -> Result<String> {
        let byte_len = audio.as_bytes().len();
        debug!(
            "Submitting {} bytes ({:.2}s) for transcription, language hint {}",
            byte_len,
            audio.duration_seconds(),
            language
        );

        let part = reqwest::multipart::Part::bytes(audio.into_bytes())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| SessionError::Transcription {
                message: format!("failed to build upload part: {}", e),
            })?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", language.as_str().to_string());

        let url = format!("{}/audio/transcriptions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SessionError::Transcription {
                message: format!("request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::Transcription {
                message: format!(
                    "transcription service returned {}: {}",
                    status,
                    super::body_snippet(&body)
                ),
            });
        }

        let value: serde_json::Value =
            response.json().await.map_err(|e| SessionError::Transcription {
                message: format!("invalid response body: {}", e),
            })?;

        let text = value
            .get("text")
            .and_then(|t| t.as_str())
            .ok_or_else(|| SessionError::Transcription {
                message: "response missing text field".to_string(),
            })?;

        Ok(text.trim().to_string())
    }
}

/// One recorded call to [`MockTranscriptionClient`].
#[derive(Debug, Clone)]
pub struct TranscriptionCall {
    pub byte_len: usize,
    pub language: String,
}

/// Scriptable transcription client for tests.
pub struct MockTranscriptionClient {
    reply: String,
    failure: Option<String>,
    calls: Arc<Mutex<Vec<TranscriptionCall>>>,
}

impl MockTranscriptionClient {
    pub fn new() -> Self {
        Self {
            reply: "mock transcript".to_string(),
            failure: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_reply(mut self, reply: &str) -> Self {
        self.reply = reply.to_string();
        self
    }

    pub fn with_failure(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Handle for inspecting calls after the client moves into a session.
    pub fn calls(&self) -> Arc<Mutex<Vec<TranscriptionCall>>> {
        Arc::clone(&self.calls)
    }
}

impl Default for MockTranscriptionClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptionClient for MockTranscriptionClient {
    async fn transcribe(&self, audio: PcmWavBuffer, language: &LanguageCode) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(TranscriptionCall {
                byte_len: audio.as_bytes().len(),
                language: language.as_str().to_string(),
            });
        }

        match &self.failure {
            Some(message) => Err(SessionError::Transcription {
                message: message.clone(),
            }),
            None => Ok(self.reply.clone()),
        }
    }
}
