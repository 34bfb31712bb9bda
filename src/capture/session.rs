use crate::audio::{
    encode, AudioClip, CaptureConfig, CaptureDevice, CaptureDeviceFactory, CaptureSource,
};
use crate::error::{Result, SessionError};
use crate::language::LanguageCode;
use crate::services::TranscriptionClient;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Lifecycle of one capture lane.
///
/// Legal transitions: Idle -> Recording (start), Recording ->
/// Finalizing (stop begins), Finalizing -> Idle (stop returns, success
/// or failure). The device handle lives inside the Recording variant,
/// so holding a device while Idle is unrepresentable.
pub enum RecordingState {
    Idle,
    Recording {
        device: Box<dyn CaptureDevice>,
        collector: JoinHandle<Vec<u8>>,
    },
    Finalizing,
}

/// One party's capture lane: device stream, chunk collection, and the
/// finalize path through encoding and transcription.
///
/// The single-active-speaker rule across lanes is the coordinator's
/// job; a lane only guards its own transitions.
pub struct CaptureSession {
    label: String,
    transcriber: Arc<dyn TranscriptionClient>,
    config: CaptureConfig,
    state: RecordingState,
}

impl CaptureSession {
    pub fn new(
        label: &str,
        transcriber: Arc<dyn TranscriptionClient>,
        config: CaptureConfig,
    ) -> Self {
        Self {
            label: label.to_string(),
            transcriber,
            config,
            state: RecordingState::Idle,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecordingState::Recording { .. })
    }

    /// Acquire a capture device and start streaming chunks.
    ///
    /// No-op with a warning if this lane is already recording. Fails
    /// with `SessionError::Device` if the device cannot be acquired or
    /// started, leaving the lane Idle.
    pub async fn start(&mut self, source: CaptureSource) -> Result<()> {
        if self.is_recording() {
            warn!("Capture already in progress ({})", self.label);
            return Ok(());
        }

        let mut device = CaptureDeviceFactory::create(source)?;
        let mut rx = device.start(&self.config).await?;
        info!("Capture started ({}) on {}", self.label, device.name());

        let collector = tokio::spawn(async move {
            let mut buffer = Vec::new();
            while let Some(chunk) = rx.recv().await {
                buffer.extend_from_slice(&chunk);
            }
            buffer
        });

        self.state = RecordingState::Recording { device, collector };
        Ok(())
    }

    /// Stop capturing, encode the clip, and transcribe it.
    ///
    /// Returns `Ok(None)` when the lane was not recording or the clip
    /// came back empty. Whatever happens, the device is released and
    /// the lane ends up Idle, so the party can record again after a
    /// failed turn.
    pub async fn stop(&mut self, language: &LanguageCode) -> Result<Option<String>> {
        let state = std::mem::replace(&mut self.state, RecordingState::Finalizing);
        let (device, collector) = match state {
            RecordingState::Recording { device, collector } => (device, collector),
            other => {
                self.state = other;
                return Ok(None);
            }
        };

        let outcome = self.finalize(device, collector, language).await;
        self.state = RecordingState::Idle;
        outcome
    }

    async fn finalize(
        &self,
        mut device: Box<dyn CaptureDevice>,
        collector: JoinHandle<Vec<u8>>,
        language: &LanguageCode,
    ) -> Result<Option<String>> {
        // Release the device first; its failure does not void the
        // chunks already collected.
        if let Err(e) = device.stop().await {
            warn!("Capture device stop failed ({}): {}", self.label, e);
        }

        let data = collector.await.map_err(|e| SessionError::Device {
            message: format!("chunk collector failed: {}", e),
        })?;
        let format = device.clip_format();
        drop(device);

        if data.is_empty() {
            info!("No audio captured ({})", self.label);
            return Ok(None);
        }

        info!("Captured {} bytes ({})", data.len(), self.label);
        let wav = encode(AudioClip { format, data })?;
        let text = self.transcriber.transcribe(wav, language).await?;
        info!(
            "Transcription complete ({}): {} chars",
            self.label,
            text.chars().count()
        );

        Ok(Some(text))
    }
}
