//! Language tables: display names for translation prompts and voice
//! profiles for speech synthesis.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Short language identifier (e.g. "en", "es").
///
/// The session core only needs equality plus the two lookups below;
/// display metadata for pickers lives outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-readable name used when building translation prompts.
    /// Unknown codes pass through as the raw code string.
    pub fn display_name(&self) -> &str {
        display_name(&self.0)
    }

    /// Synthesis voice for this language, with the documented fallback.
    pub fn voice_profile(&self) -> VoiceProfile {
        voice_profile(&self.0)
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LanguageCode {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

/// Voice selection passed to the speech-synthesis service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceProfile {
    pub voice: &'static str,

    /// Regional language tag understood by the synthesis engine.
    pub language_tag: &'static str,
}

pub fn display_name(code: &str) -> &str {
    match code {
        "en" => "English",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "pt" => "Portuguese",
        "zh" => "Chinese",
        "ja" => "Japanese",
        "ko" => "Korean",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "ru" => "Russian",
        "vi" => "Vietnamese",
        "tl" => "Tagalog",
        other => other,
    }
}

/// Maps a language code to a synthesis voice.
///
/// Languages without a dedicated voice (vi, tl) and unknown codes fall
/// back to the English voice instead of failing.
pub fn voice_profile(code: &str) -> VoiceProfile {
    let (voice, language_tag) = match code {
        "en" => ("Joanna", "en-US"),
        "es" => ("Lucia", "es-ES"),
        "fr" => ("Lea", "fr-FR"),
        "de" => ("Vicki", "de-DE"),
        "it" => ("Bianca", "it-IT"),
        "pt" => ("Vitoria", "pt-BR"),
        "zh" => ("Zhiyu", "cmn-CN"),
        "ja" => ("Mizuki", "ja-JP"),
        "ko" => ("Seoyeon", "ko-KR"),
        "ar" => ("Zeina", "ar-XA"),
        "hi" => ("Aditi", "hi-IN"),
        "ru" => ("Tatyana", "ru-RU"),
        _ => ("Joanna", "en-US"),
    };
    VoiceProfile { voice, language_tag }
}
