use crate::audio::CaptureConfig;
use crate::language::LanguageCode;

/// Tunables for one translation session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Unique session identifier (e.g., "session-2026-intake-03")
    pub session_id: String,

    /// Language the provider speaks
    pub provider_language: LanguageCode,

    /// Language the patient speaks
    pub patient_language: LanguageCode,

    /// Chat model used for refinement and translation
    pub chat_model: String,

    /// Capture settings applied to both lanes
    pub capture: CaptureConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            provider_language: LanguageCode::new("en"),
            patient_language: LanguageCode::new("es"),
            chat_model: "gpt-4o-mini".to_string(),
            capture: CaptureConfig::default(),
        }
    }
}

impl SessionOptions {
    pub fn with_languages(mut self, provider: LanguageCode, patient: LanguageCode) -> Self {
        self.provider_language = provider;
        self.patient_language = patient;
        self
    }

    pub fn with_chat_model(mut self, model: &str) -> Self {
        self.chat_model = model.to_string();
        self
    }
}
