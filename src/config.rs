use crate::audio::CaptureConfig;
use crate::error::{Result, SessionError};
use crate::language::LanguageCode;
use crate::session::SessionOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub services: ServicesConfig,
    pub session: SessionConfig,
    pub capture: CaptureSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Base URL shared by the service endpoints
    pub base_url: String,

    /// Bearer token; usually supplied via environment
    pub api_key: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    pub transcription: TranscriptionConfig,
    pub chat: ChatConfig,
    pub speech: SpeechConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub model: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    pub path: String,
    pub provider: String,
    pub engine: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub provider_language: String,
    pub patient_language: String,

    /// Speak each translation automatically after a turn completes
    pub speak_translations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSettings {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub chunk_frames: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            services: ServicesConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: String::new(),
                timeout_secs: 30,
                transcription: TranscriptionConfig {
                    model: "whisper-1".to_string(),
                },
                chat: ChatConfig {
                    model: "gpt-4o-mini".to_string(),
                    path: "/chat/completions".to_string(),
                },
                speech: SpeechConfig {
                    path: "/audio/speech".to_string(),
                    provider: "aws-polly".to_string(),
                    engine: "standard".to_string(),
                },
            },
            session: SessionConfig {
                provider_language: "en".to_string(),
                patient_language: "es".to_string(),
                speak_translations: true,
            },
            capture: CaptureSettings {
                echo_cancellation: true,
                noise_suppression: true,
                chunk_frames: 1600,
            },
        }
    }
}

impl Config {
    /// Load configuration in priority order: defaults, then a TOML
    /// file (the given path, or an optional `config.toml`), then
    /// `MEDBRIDGE`-prefixed environment variables
    /// (e.g. `MEDBRIDGE_SERVICES__API_KEY`).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let defaults =
            config::Config::try_from(&Config::default()).map_err(|e| SessionError::Config {
                message: format!("invalid built-in defaults: {}", e),
            })?;

        let mut builder = config::Config::builder().add_source(defaults);

        builder = match path {
            Some(path) => builder.add_source(config::File::with_name(path)),
            None => builder.add_source(config::File::with_name("config").required(false)),
        };

        let settings = builder
            .add_source(config::Environment::with_prefix("MEDBRIDGE").separator("__"))
            .build()
            .map_err(|e| SessionError::Config {
                message: e.to_string(),
            })?;

        settings.try_deserialize().map_err(|e| SessionError::Config {
            message: e.to_string(),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.services.timeout_secs)
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            echo_cancellation: self.capture.echo_cancellation,
            noise_suppression: self.capture.noise_suppression,
            chunk_frames: self.capture.chunk_frames,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        let mut options = SessionOptions::default().with_languages(
            LanguageCode::new(&self.session.provider_language),
            LanguageCode::new(&self.session.patient_language),
        );
        options.chat_model = self.services.chat.model.clone();
        options.capture = self.capture_config();
        options
    }
}
