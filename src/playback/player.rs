use crate::audio::{decode_to_pcm, AudioOutput, PcmAudio, PlaybackEnd, PlaybackHandle};
use crate::error::{Result, SessionError};
use crate::language::LanguageCode;
use crate::services::{SpeechSynthesisClient, SynthesisAudio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// The currently playing utterance.
///
/// Each utterance has its own speaking flag; the watcher task that
/// observes completion flips only the flag of the utterance it was
/// spawned for, so a stale watcher cannot clear a newer utterance's
/// state.
struct Utterance {
    stop: Option<oneshot::Sender<()>>,
    speaking: Arc<AtomicBool>,
}

/// One party's text-to-speech lane: synthesis, normalization, and a
/// single cancellable playback slot.
pub struct SpeechPlayback {
    label: String,
    synthesis: Arc<dyn SpeechSynthesisClient>,
    output: Arc<dyn AudioOutput>,
    http: reqwest::Client,
    utterance: Mutex<Option<Utterance>>,
}

impl SpeechPlayback {
    pub fn new(
        label: &str,
        synthesis: Arc<dyn SpeechSynthesisClient>,
        output: Arc<dyn AudioOutput>,
    ) -> Self {
        Self {
            label: label.to_string(),
            synthesis,
            output,
            http: reqwest::Client::new(),
            utterance: Mutex::new(None),
        }
    }

    /// Synthesize the text in the given language's voice and play it.
    ///
    /// Empty text is a no-op. Any previous utterance is stopped before
    /// the new one starts. Synthesis, normalization, and begin failures
    /// surface (`Playback`, or `PlaybackBlocked` when the output
    /// refuses to start); the speaking flag is false after any failure.
    pub async fn speak(&self, text: &str, language: &LanguageCode) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }

        self.stop();

        let voice = language.voice_profile();
        debug!(
            "Speaking ({}): voice {} ({})",
            self.label, voice.voice, voice.language_tag
        );

        let audio = self.synthesis.synthesize(text, &voice).await?;
        let pcm = self.normalize(audio).await?;
        let handle = self.output.begin(pcm).await?;

        let PlaybackHandle { stop, done } = handle;
        let speaking = Arc::new(AtomicBool::new(true));

        let watcher_flag = Arc::clone(&speaking);
        let label = self.label.clone();
        tokio::spawn(async move {
            match done.await {
                Ok(PlaybackEnd::Completed) => debug!("Playback completed ({})", label),
                Ok(PlaybackEnd::Stopped) => debug!("Playback stopped ({})", label),
                Ok(PlaybackEnd::Failed(message)) => {
                    warn!("Playback failed ({}): {}", label, message)
                }
                Err(_) => warn!("Playback ended without reporting ({})", label),
            }
            watcher_flag.store(false, Ordering::SeqCst);
        });

        if let Ok(mut slot) = self.utterance.lock() {
            *slot = Some(Utterance {
                stop: Some(stop),
                speaking,
            });
        }

        Ok(())
    }

    /// Stop the current utterance, releasing its playback resource.
    ///
    /// Idempotent; nothing active is a no-op.
    pub fn stop(&self) {
        if let Ok(mut slot) = self.utterance.lock() {
            if let Some(mut utterance) = slot.take() {
                if let Some(stop) = utterance.stop.take() {
                    // The device side may already be gone after a
                    // natural completion.
                    let _ = stop.send(());
                }
                utterance.speaking.store(false, Ordering::SeqCst);
                debug!("Playback stop requested ({})", self.label);
            }
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.utterance
            .lock()
            .map(|slot| {
                slot.as_ref()
                    .map(|u| u.speaking.load(Ordering::SeqCst))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    /// Collapse the four synthesis response shapes into playable PCM.
    ///
    /// Every encoded form goes through the one decode call; the two
    /// reference shapes differ only in how the bytes arrive.
    async fn normalize(&self, audio: SynthesisAudio) -> Result<PcmAudio> {
        let bytes = match audio {
            SynthesisAudio::Ready(pcm) => return Ok(pcm),
            SynthesisAudio::Bytes(bytes) => bytes,
            SynthesisAudio::Url(url) | SynthesisAudio::Envelope { url } => {
                self.fetch(&url).await?
            }
        };

        decode_to_pcm(bytes, None).map_err(|e| SessionError::Playback {
            message: format!("failed to decode synthesized audio: {}", e),
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching synthesized audio from {}", url);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SessionError::Playback {
                message: format!("failed to fetch synthesized audio: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Playback {
                message: format!("audio fetch returned {}", status),
            });
        }

        let bytes = response.bytes().await.map_err(|e| SessionError::Playback {
            message: format!("failed to read fetched audio: {}", e),
        })?;

        Ok(bytes.to_vec())
    }
}
