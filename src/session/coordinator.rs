use super::config::SessionOptions;
use super::state::{PartyRole, SessionStats, TurnReport};
use crate::audio::{AudioOutput, CaptureSource};
use crate::capture::CaptureSession;
use crate::error::Result;
use crate::language::LanguageCode;
use crate::playback::SpeechPlayback;
use crate::services::{ChatClient, SpeechSynthesisClient, TranscriptionClient};
use crate::translation::TranslationPipeline;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Language pair and transcript slots, guarded by one lock so a swap
/// can never expose a half-swapped view.
#[derive(Debug, Clone)]
struct Exchange {
    provider_language: LanguageCode,
    patient_language: LanguageCode,
    provider_transcript: String,
    patient_transcript: String,
}

impl Exchange {
    fn language(&self, party: PartyRole) -> &LanguageCode {
        match party {
            PartyRole::Provider => &self.provider_language,
            PartyRole::Patient => &self.patient_language,
        }
    }

    fn transcript(&self, party: PartyRole) -> &str {
        match party {
            PartyRole::Provider => &self.provider_transcript,
            PartyRole::Patient => &self.patient_transcript,
        }
    }

    fn set_transcript(&mut self, party: PartyRole, text: String) {
        match party {
            PartyRole::Provider => self.provider_transcript = text,
            PartyRole::Patient => self.patient_transcript = text,
        }
    }

    fn set_language(&mut self, party: PartyRole, language: LanguageCode) {
        match party {
            PartyRole::Provider => self.provider_language = language,
            PartyRole::Patient => self.patient_language = language,
        }
    }

    fn swap(&mut self) {
        std::mem::swap(&mut self.provider_language, &mut self.patient_language);
        std::mem::swap(&mut self.provider_transcript, &mut self.patient_transcript);
    }
}

/// Top-level controller for one two-party translation session.
///
/// Owns both capture lanes and both playback lanes, enforces the
/// single-active-speaker rule, and routes each party's translated
/// speech into the counterpart's transcript slot.
///
/// Locking: the active-speaker slot is taken first and may be held
/// while one inner lock is taken; the capture-lane locks and the
/// exchange lock are never held at the same time.
pub struct SessionCoordinator {
    session_id: String,
    started_at: DateTime<Utc>,
    active: Mutex<Option<PartyRole>>,
    provider_capture: Mutex<CaptureSession>,
    patient_capture: Mutex<CaptureSession>,
    provider_playback: SpeechPlayback,
    patient_playback: SpeechPlayback,
    exchange: Arc<Mutex<Exchange>>,
    pipeline: Arc<TranslationPipeline>,
    turns_completed: Arc<AtomicUsize>,
}

impl SessionCoordinator {
    pub fn new(
        transcriber: Arc<dyn TranscriptionClient>,
        chat: Arc<dyn ChatClient>,
        synthesis: Arc<dyn SpeechSynthesisClient>,
        output: Arc<dyn AudioOutput>,
        options: SessionOptions,
    ) -> Self {
        info!("Creating translation session: {}", options.session_id);

        let pipeline = Arc::new(TranslationPipeline::new(chat, &options.chat_model));

        Self {
            session_id: options.session_id,
            started_at: Utc::now(),
            active: Mutex::new(None),
            provider_capture: Mutex::new(CaptureSession::new(
                "provider",
                Arc::clone(&transcriber),
                options.capture.clone(),
            )),
            patient_capture: Mutex::new(CaptureSession::new(
                "patient",
                transcriber,
                options.capture,
            )),
            provider_playback: SpeechPlayback::new(
                "provider",
                Arc::clone(&synthesis),
                Arc::clone(&output),
            ),
            patient_playback: SpeechPlayback::new("patient", synthesis, output),
            exchange: Arc::new(Mutex::new(Exchange {
                provider_language: options.provider_language,
                patient_language: options.patient_language,
                provider_transcript: String::new(),
                patient_transcript: String::new(),
            })),
            pipeline,
            turns_completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn capture_lane(&self, party: PartyRole) -> &Mutex<CaptureSession> {
        match party {
            PartyRole::Provider => &self.provider_capture,
            PartyRole::Patient => &self.patient_capture,
        }
    }

    fn playback_lane(&self, party: PartyRole) -> &SpeechPlayback {
        match party {
            PartyRole::Provider => &self.provider_playback,
            PartyRole::Patient => &self.patient_playback,
        }
    }

    /// Start capturing the given party.
    ///
    /// If the other party is recording, it is preempted: its clip is
    /// finalized and transcribed before the new capture starts, and
    /// its translation completes in a background task so the handover
    /// is not delayed by the remote call.
    pub async fn start_recording(&self, party: PartyRole, source: CaptureSource) -> Result<()> {
        let mut active = self.active.lock().await;

        if let Some(current) = *active {
            if current == party {
                warn!("{} is already recording", party);
                return Ok(());
            }
            info!("Preempting {} so {} can record", current, party);
            self.preempt(current).await;
            *active = None;
        }

        {
            let mut capture = self.capture_lane(party).lock().await;
            capture.start(source).await?;
        }

        *active = Some(party);
        Ok(())
    }

    /// Stop the given party's capture and run its turn to completion.
    ///
    /// Returns `Ok(None)` when the party was not recording or nothing
    /// was captured. On translation failure the party's own transcript
    /// stays written and the counterpart's is left unchanged.
    pub async fn stop_recording(&self, party: PartyRole) -> Result<Option<TurnReport>> {
        let mut active = self.active.lock().await;
        if *active != Some(party) {
            return Ok(None);
        }

        let language = { self.exchange.lock().await.language(party).clone() };

        let outcome = {
            let mut capture = self.capture_lane(party).lock().await;
            capture.stop(&language).await
        };

        *active = None;
        // Release the slot before the remote translation call so the
        // other party can start recording meanwhile.
        drop(active);

        let text = match outcome? {
            Some(text) => text,
            None => return Ok(None),
        };

        let (source_language, target_language) = self.record_transcript(party, &text).await;

        let translation = Self::run_translation(
            Arc::clone(&self.exchange),
            Arc::clone(&self.pipeline),
            Arc::clone(&self.turns_completed),
            party,
            text.clone(),
            source_language,
            target_language,
        )
        .await?;

        Ok(Some(TurnReport {
            party,
            transcript: text,
            translation,
        }))
    }

    /// Finalize a preempted party's turn. Capture and transcription
    /// run inline while the active slot is still held; the translation
    /// is spawned off. A failed turn is logged and dropped.
    async fn preempt(&self, party: PartyRole) {
        let language = { self.exchange.lock().await.language(party).clone() };

        let outcome = {
            let mut capture = self.capture_lane(party).lock().await;
            capture.stop(&language).await
        };

        let text = match outcome {
            Ok(Some(text)) => text,
            Ok(None) => return,
            Err(e) => {
                error!("Preempted turn lost for {}: {}", party, e);
                return;
            }
        };

        let (source_language, target_language) = self.record_transcript(party, &text).await;

        let exchange = Arc::clone(&self.exchange);
        let pipeline = Arc::clone(&self.pipeline);
        let turns = Arc::clone(&self.turns_completed);
        tokio::spawn(async move {
            match Self::run_translation(
                exchange,
                pipeline,
                turns,
                party,
                text,
                source_language,
                target_language,
            )
            .await
            {
                Ok(Some(_)) => info!("Background translation delivered for {}", party),
                Ok(None) => {}
                Err(e) => error!("Background translation failed for {}: {}", party, e),
            }
        });
    }

    /// Write the party's own transcript and snapshot the language pair
    /// in one exchange-lock acquisition.
    async fn record_transcript(
        &self,
        party: PartyRole,
        text: &str,
    ) -> (LanguageCode, LanguageCode) {
        let mut exchange = self.exchange.lock().await;
        exchange.set_transcript(party, text.to_string());
        (
            exchange.language(party).clone(),
            exchange.language(party.other()).clone(),
        )
    }

    async fn run_translation(
        exchange: Arc<Mutex<Exchange>>,
        pipeline: Arc<TranslationPipeline>,
        turns: Arc<AtomicUsize>,
        party: PartyRole,
        text: String,
        source: LanguageCode,
        target: LanguageCode,
    ) -> Result<Option<String>> {
        let translation = pipeline.translate(&text, &source, &target).await?;

        if let Some(ref translated) = translation {
            exchange
                .lock()
                .await
                .set_transcript(party.other(), translated.clone());
        }

        turns.fetch_add(1, Ordering::SeqCst);
        Ok(translation)
    }

    /// Speak the party's current transcript in the party's language.
    ///
    /// Translations land in the counterpart's slot, so each party
    /// plays back its own slot.
    pub async fn speak(&self, party: PartyRole) -> Result<()> {
        let (text, language) = {
            let exchange = self.exchange.lock().await;
            (
                exchange.transcript(party).to_string(),
                exchange.language(party).clone(),
            )
        };

        self.playback_lane(party).speak(&text, &language).await
    }

    /// Stop the party's playback, if any.
    pub fn stop_speaking(&self, party: PartyRole) {
        self.playback_lane(party).stop();
    }

    /// Exchange both languages and both transcripts in one step.
    pub async fn swap_languages(&self) {
        let mut exchange = self.exchange.lock().await;
        exchange.swap();
        info!(
            "Languages swapped: provider={}, patient={}",
            exchange.provider_language, exchange.patient_language
        );
    }

    /// Stop both playbacks and empty both transcripts. Languages and
    /// recording state stay as they are.
    pub async fn clear_session(&self) {
        self.provider_playback.stop();
        self.patient_playback.stop();

        let mut exchange = self.exchange.lock().await;
        exchange.provider_transcript.clear();
        exchange.patient_transcript.clear();
        info!("Session cleared: {}", self.session_id);
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn transcript(&self, party: PartyRole) -> String {
        self.exchange.lock().await.transcript(party).to_string()
    }

    pub async fn language(&self, party: PartyRole) -> LanguageCode {
        self.exchange.lock().await.language(party).clone()
    }

    pub async fn set_language(&self, party: PartyRole, language: LanguageCode) {
        let mut exchange = self.exchange.lock().await;
        exchange.set_language(party, language);
    }

    pub async fn active_speaker(&self) -> Option<PartyRole> {
        *self.active.lock().await
    }

    pub async fn is_recording(&self, party: PartyRole) -> bool {
        self.capture_lane(party).lock().await.is_recording()
    }

    pub fn is_speaking(&self, party: PartyRole) -> bool {
        self.playback_lane(party).is_speaking()
    }

    /// Current session statistics
    pub async fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);

        SessionStats {
            session_id: self.session_id.clone(),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            turns_completed: self.turns_completed.load(Ordering::SeqCst),
            active_speaker: *self.active.lock().await,
            provider_speaking: self.provider_playback.is_speaking(),
            patient_speaking: self.patient_playback.is_speaking(),
        }
    }
}
