use crate::error::Result;
use crate::language::LanguageCode;
use crate::services::{ChatClient, ChatTurn};
use std::sync::Arc;
use tracing::{debug, warn};

const REFINE_PROMPT: &str = "You are a medical scribe. Your task is to correct any phonetic errors in the following transcript, specifically for medical terminology. For example:
- \"Met-form-in\" should be \"Metformin\"
- \"a see toe men o fen\" should be \"Acetaminophen\"
- \"high per tension\" should be \"hypertension\"
- \"die uh beet eez\" should be \"diabetes\"

Only correct obvious phonetic/spelling errors for medical terms. Preserve the original meaning and non-medical words. Return only the corrected text without any explanations.";

fn translation_prompt(source: &str, target: &str) -> String {
    format!(
        "You are a professional medical translator. Your task is to translate medical conversations from {source} to {target}.

Guidelines:
1. Maintain clinical accuracy - use proper medical terminology in the target language
2. Keep a compassionate and professional tone appropriate for healthcare settings
3. Preserve important medical details like dosages, frequencies, and instructions
4. If a medical term doesn't have a direct translation, use the internationally recognized term
5. Return only the translation without any explanations or notes"
    )
}

/// Two-pass text pipeline: terminology refinement, then translation.
///
/// Refinement always runs first and its output feeds the translation
/// call. Refinement failures fall back to the unrefined text;
/// translation failures propagate.
pub struct TranslationPipeline {
    chat: Arc<dyn ChatClient>,
    model: String,
}

impl TranslationPipeline {
    pub fn new(chat: Arc<dyn ChatClient>, model: &str) -> Self {
        Self {
            chat,
            model: model.to_string(),
        }
    }

    /// Correct phonetic transcription errors in medical vocabulary.
    ///
    /// Infallible: empty input comes back unchanged without a remote
    /// call, and a failed refinement call falls back to the input.
    pub async fn refine(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }

        let turns = vec![ChatTurn::system(REFINE_PROMPT), ChatTurn::user(text)];
        match self.chat.complete(&self.model, &turns).await {
            Ok(refined) => refined,
            Err(e) => {
                warn!("Terminology refinement failed, keeping original text: {}", e);
                text.to_string()
            }
        }
    }

    /// Translate one utterance between the party languages.
    ///
    /// Returns `Ok(None)` for empty input and `Ok(Some(text))`
    /// unchanged when source and target match; neither case makes a
    /// remote call.
    pub async fn translate(
        &self,
        text: &str,
        source: &LanguageCode,
        target: &LanguageCode,
    ) -> Result<Option<String>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        if source == target {
            return Ok(Some(text.to_string()));
        }

        let refined = self.refine(text).await;

        debug!(
            "Translating {} chars: {} -> {}",
            refined.chars().count(),
            source,
            target
        );

        let prompt = translation_prompt(source.display_name(), target.display_name());
        let turns = vec![ChatTurn::system(prompt), ChatTurn::user(refined)];
        let translated = self.chat.complete(&self.model, &turns).await?;

        Ok(Some(translated))
    }
}
