use crate::error::{Result, SessionError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// Decoded playable audio (16-bit PCM, interleaved)
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

impl PcmAudio {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// How one playback run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEnd {
    /// Reached the end of the audio
    Completed,
    /// Interrupted by a stop signal
    Stopped,
    /// The device failed mid-playback
    Failed(String),
}

/// Control handle for one utterance being played.
///
/// The stop sender interrupts the device task; the done receiver
/// reports how the run ended. Dropping the stop sender unsignalled
/// also stops the run, so an abandoned handle cannot leak a device.
pub struct PlaybackHandle {
    pub stop: oneshot::Sender<()>,
    pub done: oneshot::Receiver<PlaybackEnd>,
}

impl PlaybackHandle {
    pub fn new(stop: oneshot::Sender<()>, done: oneshot::Receiver<PlaybackEnd>) -> Self {
        Self { stop, done }
    }
}

/// Speaker-side playback trait
///
/// Implementations:
/// - `MockAudioOutput`: configurable in-memory output (tests, feature-off builds)
/// - `CpalAudioOutput`: real speaker via cpal (feature `cpal-audio`)
#[async_trait::async_trait]
pub trait AudioOutput: Send + Sync {
    /// Begin playing; returns once playback has started.
    ///
    /// Fails with `SessionError::PlaybackBlocked` when the device
    /// refuses to start and `SessionError::Playback` otherwise.
    async fn begin(&self, audio: PcmAudio) -> Result<PlaybackHandle>;

    /// Output name for logging
    fn name(&self) -> &str;
}

/// Audio output factory
pub struct AudioOutputFactory;

impl AudioOutputFactory {
    /// Create the default speaker output: the cpal speaker when the
    /// `cpal-audio` feature is on, a silent in-memory output otherwise.
    pub fn create_default() -> Result<Arc<dyn AudioOutput>> {
        #[cfg(feature = "cpal-audio")]
        {
            let output = super::hardware::CpalAudioOutput::new()?;
            Ok(Arc::new(output))
        }

        #[cfg(not(feature = "cpal-audio"))]
        {
            use tracing::warn;
            warn!("cpal-audio feature is off; playback goes to a silent in-memory output");
            Ok(Arc::new(MockAudioOutput::new()))
        }
    }
}

/// Shared counters of a mock output's lifecycle, for assertions.
#[derive(Debug, Clone)]
pub struct OutputProbe {
    begun: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
    last_audio: Arc<Mutex<Option<PcmAudio>>>,
}

impl OutputProbe {
    pub fn begun(&self) -> usize {
        self.begun.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn last_audio(&self) -> Option<PcmAudio> {
        self.last_audio.lock().ok().and_then(|audio| audio.clone())
    }
}

/// In-memory audio output with configurable behavior.
pub struct MockAudioOutput {
    play_duration: Option<Duration>,
    fail_begin: bool,
    reject_begin: bool,
    fail_during: Option<String>,
    begun: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
    last_audio: Arc<Mutex<Option<PcmAudio>>>,
}

impl MockAudioOutput {
    /// Output that completes every run immediately.
    pub fn new() -> Self {
        Self {
            play_duration: None,
            fail_begin: false,
            reject_begin: false,
            fail_during: None,
            begun: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicUsize::new(0)),
            stopped: Arc::new(AtomicUsize::new(0)),
            last_audio: Arc::new(Mutex::new(None)),
        }
    }

    /// Hold each run open for the given duration before completing,
    /// leaving a window for stop signals.
    pub fn with_play_duration(mut self, duration: Duration) -> Self {
        self.play_duration = Some(duration);
        self
    }

    /// Fail `begin` with a generic playback error.
    pub fn with_begin_failure(mut self) -> Self {
        self.fail_begin = true;
        self
    }

    /// Refuse `begin` the way a blocked output device would.
    pub fn with_begin_rejection(mut self) -> Self {
        self.reject_begin = true;
        self
    }

    /// End each run with a device failure instead of completion.
    pub fn with_play_failure(mut self, message: impl Into<String>) -> Self {
        self.fail_during = Some(message.into());
        self
    }

    pub fn probe(&self) -> OutputProbe {
        OutputProbe {
            begun: Arc::clone(&self.begun),
            completed: Arc::clone(&self.completed),
            stopped: Arc::clone(&self.stopped),
            last_audio: Arc::clone(&self.last_audio),
        }
    }
}

impl Default for MockAudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AudioOutput for MockAudioOutput {
    async fn begin(&self, audio: PcmAudio) -> Result<PlaybackHandle> {
        if self.fail_begin {
            return Err(SessionError::Playback {
                message: "mock output failed to start".to_string(),
            });
        }
        if self.reject_begin {
            return Err(SessionError::PlaybackBlocked {
                message: "mock output refused to start".to_string(),
            });
        }

        self.begun.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_audio.lock() {
            *last = Some(audio);
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        let play_duration = self.play_duration;
        let fail_during = self.fail_during.clone();
        let completed = Arc::clone(&self.completed);
        let stopped = Arc::clone(&self.stopped);

        tokio::spawn(async move {
            let end = match play_duration {
                None => match fail_during {
                    Some(message) => PlaybackEnd::Failed(message),
                    None => PlaybackEnd::Completed,
                },
                Some(duration) => {
                    tokio::select! {
                        _ = tokio::time::sleep(duration) => match fail_during {
                            Some(message) => PlaybackEnd::Failed(message),
                            None => PlaybackEnd::Completed,
                        },
                        _ = stop_rx => PlaybackEnd::Stopped,
                    }
                }
            };

            match &end {
                PlaybackEnd::Completed => {
                    completed.fetch_add(1, Ordering::SeqCst);
                }
                PlaybackEnd::Stopped => {
                    stopped.fetch_add(1, Ordering::SeqCst);
                }
                PlaybackEnd::Failed(_) => {}
            }

            let _ = done_tx.send(end);
        });

        Ok(PlaybackHandle::new(stop_tx, done_rx))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beep() -> PcmAudio {
        PcmAudio {
            samples: vec![0i16; 160],
            sample_rate: 16000,
            channels: 1,
        }
    }

    #[test]
    fn test_pcm_audio_frames_and_duration() {
        let audio = PcmAudio {
            samples: vec![0i16; 32000],
            sample_rate: 16000,
            channels: 2,
        };
        assert_eq!(audio.frames(), 16000);
        assert!((audio.duration_seconds() - 1.0).abs() < 1e-9);
    }

    #[cfg(not(feature = "cpal-audio"))]
    #[tokio::test]
    async fn test_default_output_plays_without_hardware() {
        let output = AudioOutputFactory::create_default().unwrap();
        let handle = output.begin(beep()).await.unwrap();
        let end = handle.done.await.unwrap();
        assert_eq!(end, PlaybackEnd::Completed);
    }

    #[tokio::test]
    async fn test_mock_output_completes_naturally() {
        let output = MockAudioOutput::new();
        let probe = output.probe();

        let handle = output.begin(beep()).await.unwrap();
        let end = handle.done.await.unwrap();

        assert_eq!(end, PlaybackEnd::Completed);
        assert_eq!(probe.begun(), 1);
        assert_eq!(probe.completed(), 1);
        assert_eq!(probe.stopped(), 0);
        assert_eq!(probe.last_audio().unwrap().samples.len(), 160);
    }

    #[tokio::test]
    async fn test_mock_output_stop_interrupts_playback() {
        let output = MockAudioOutput::new().with_play_duration(Duration::from_secs(30));
        let probe = output.probe();

        let handle = output.begin(beep()).await.unwrap();
        let PlaybackHandle { stop, done } = handle;
        stop.send(()).unwrap();

        let end = done.await.unwrap();
        assert_eq!(end, PlaybackEnd::Stopped);
        assert_eq!(probe.stopped(), 1);
        assert_eq!(probe.completed(), 0);
    }

    #[tokio::test]
    async fn test_mock_output_begin_rejection_is_blocked_error() {
        let output = MockAudioOutput::new().with_begin_rejection();
        let result = output.begin(beep()).await;
        assert!(matches!(
            result,
            Err(SessionError::PlaybackBlocked { .. })
        ));
    }

    #[tokio::test]
    async fn test_mock_output_play_failure_reports_failed_end() {
        let output = MockAudioOutput::new().with_play_failure("underrun");
        let handle = output.begin(beep()).await.unwrap();
        let end = handle.done.await.unwrap();
        assert_eq!(end, PlaybackEnd::Failed("underrun".to_string()));
    }

    #[tokio::test]
    async fn test_dropping_stop_sender_interrupts_playback() {
        let output = MockAudioOutput::new().with_play_duration(Duration::from_secs(30));
        let handle = output.begin(beep()).await.unwrap();

        let PlaybackHandle { stop, done } = handle;
        drop(stop);

        let end = done.await.unwrap();
        assert_eq!(end, PlaybackEnd::Stopped);
    }
}
