use crate::audio::PcmAudio;
use crate::error::{Result, SessionError};
use crate::language::VoiceProfile;
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Synthesized speech in the shape the service returned it.
///
/// Bridge services reply in four shapes; every caller goes through one
/// normalization function, so adding a shape here is a compile-time
/// gap everywhere it is matched.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisAudio {
    /// Already decoded, ready to play
    Ready(PcmAudio),
    /// Remote reference to the audio
    Url(String),
    /// Raw encoded audio bytes
    Bytes(Vec<u8>),
    /// JSON envelope carrying a reference
    Envelope { url: String },
}

/// Speech-synthesis contract.
///
/// The voice profile carries both the voice name and the language tag
/// the synthesis provider expects.
#[async_trait]
pub trait SpeechSynthesisClient: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> Result<SynthesisAudio>;
}

/// JSON synthesis client posting `{text, provider, voice, engine, language}`.
pub struct HttpSpeechClient {
    client: Client,
    url: String,
    api_key: String,
    provider: String,
    engine: String,
}

impl HttpSpeechClient {
    pub fn new(
        base_url: &str,
        path: &str,
        api_key: &str,
        provider: &str,
        engine: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Config {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            url: format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                path.trim_start_matches('/')
            ),
            api_key: api_key.to_string(),
            provider: provider.to_string(),
            engine: engine.to_string(),
        })
    }
}

#[async_trait]
impl SpeechSynthesisClient for HttpSpeechClient {
    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> Result<SynthesisAudio> {
        debug!(
            "Synthesis request: voice={}, language={}, {} chars",
            voice.voice,
            voice.language_tag,
            text.chars().count()
        );

        let body = json!({
            "text": text,
            "provider": self.provider,
            "voice": voice.voice,
            "engine": self.engine,
            "language": voice.language_tag,
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::Playback {
                message: format!("synthesis request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::Playback {
                message: format!(
                    "speech service returned {}: {}",
                    status,
                    super::body_snippet(&body)
                ),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = response.bytes().await.map_err(|e| SessionError::Playback {
            message: format!("failed to read synthesis response body: {}", e),
        })?;

        classify_synthesis_body(&content_type, &body)
    }
}

/// Sort a successful synthesis response into its wire shape.
///
/// An `audio/*` content type wins outright; then a JSON envelope with
/// `url` or base64 `audio_content`; a bare URL body is the last
/// recognized form. Anything else is an error.
fn classify_synthesis_body(content_type: &str, body: &[u8]) -> Result<SynthesisAudio> {
    if content_type.starts_with("audio/") {
        return Ok(SynthesisAudio::Bytes(body.to_vec()));
    }

    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(url) = value.get("url").and_then(|u| u.as_str()) {
            return Ok(SynthesisAudio::Envelope {
                url: url.to_string(),
            });
        }
        if let Some(encoded) = value.get("audio_content").and_then(|c| c.as_str()) {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| SessionError::Playback {
                    message: format!("invalid base64 audio content: {}", e),
                })?;
            return Ok(SynthesisAudio::Bytes(bytes));
        }
    }

    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.starts_with("http") {
        return Ok(SynthesisAudio::Url(trimmed.to_string()));
    }

    Err(SessionError::Playback {
        message: format!(
            "unrecognized synthesis response shape: {}",
            super::body_snippet(trimmed)
        ),
    })
}

/// One recorded call to [`MockSpeechClient`].
#[derive(Debug, Clone)]
pub struct SynthesisCall {
    pub text: String,
    pub voice: String,
    pub language_tag: String,
}

/// Scriptable synthesis client for tests.
pub struct MockSpeechClient {
    response: SynthesisAudio,
    failure: Option<String>,
    calls: Arc<Mutex<Vec<SynthesisCall>>>,
}

impl MockSpeechClient {
    pub fn new() -> Self {
        Self {
            // A short stretch of silence, playable without decoding.
            response: SynthesisAudio::Ready(PcmAudio {
                samples: vec![0; 1600],
                sample_rate: 16000,
                channels: 1,
            }),
            failure: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_response(mut self, response: SynthesisAudio) -> Self {
        self.response = response;
        self
    }

    pub fn with_failure(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Handle for inspecting calls after the client moves into a player.
    pub fn calls(&self) -> Arc<Mutex<Vec<SynthesisCall>>> {
        Arc::clone(&self.calls)
    }
}

impl Default for MockSpeechClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechSynthesisClient for MockSpeechClient {
    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> Result<SynthesisAudio> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(SynthesisCall {
                text: text.to_string(),
                voice: voice.voice.to_string(),
                language_tag: voice.language_tag.to_string(),
            });
        }

        match &self.failure {
            Some(message) => Err(SessionError::Playback {
                message: message.clone(),
            }),
            None => Ok(self.response.clone()),
        }
    }
}
