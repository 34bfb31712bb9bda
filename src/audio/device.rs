use crate::error::{Result, SessionError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Declared format of a captured clip's byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipFormat {
    /// An encoded container (wav, ogg, mp3, ...). The extension hint
    /// helps the decoder's probe but is not required.
    Encoded { extension_hint: Option<String> },
    /// Raw interleaved little-endian 16-bit PCM from a local device.
    Pcm { sample_rate: u32, channels: u16 },
}

impl ClipFormat {
    pub fn encoded(extension_hint: impl Into<String>) -> Self {
        Self::Encoded {
            extension_hint: Some(extension_hint.into()),
        }
    }

    pub fn wav() -> Self {
        Self::encoded("wav")
    }
}

/// One captured utterance: opaque bytes plus their declared format.
///
/// Produced by concatenating a device's chunk stream; consumed exactly
/// once by the encoder.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub format: ClipFormat,
    pub data: Vec<u8>,
}

impl AudioClip {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Configuration for capture devices
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Ask the platform to run acoustic echo cancellation
    pub echo_cancellation: bool,
    /// Ask the platform to suppress steady background noise
    pub noise_suppression: bool,
    /// Preferred frames per emitted chunk (devices may adjust)
    pub chunk_frames: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            chunk_frames: 1600, // 100ms at 16kHz
        }
    }
}

/// Microphone capture trait
///
/// Implementations:
/// - `ScriptedCaptureDevice`: replays a prepared buffer (tests, batch runs)
/// - `CpalCaptureDevice`: real microphone via cpal (feature `cpal-audio`)
#[async_trait::async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Acquire the device and start capturing.
    ///
    /// Returns a channel receiver delivering fragments of one encoded
    /// stream; concatenating every fragment yields a clip in
    /// `clip_format()`. Fails with `SessionError::Device` if the
    /// device cannot be acquired.
    async fn start(&mut self, config: &CaptureConfig) -> Result<mpsc::Receiver<Vec<u8>>>;

    /// Stop capturing and release the device.
    async fn stop(&mut self) -> Result<()>;

    /// Format of the concatenated chunk stream.
    fn clip_format(&self) -> ClipFormat;

    /// Check if the device is currently capturing
    fn is_capturing(&self) -> bool;

    /// Device name for logging
    fn name(&self) -> &str;
}

/// Capture source selector for the factory.
pub enum CaptureSource {
    /// Default system microphone (requires the `cpal-audio` feature)
    Microphone,
    /// Replay a prepared encoded buffer
    Buffer { data: Vec<u8>, format: ClipFormat },
    /// A device built by the caller (dependency injection for tests)
    Device(Box<dyn CaptureDevice>),
}

impl CaptureSource {
    pub fn device(device: impl CaptureDevice + 'static) -> Self {
        Self::Device(Box::new(device))
    }
}

impl std::fmt::Debug for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Microphone => write!(f, "Microphone"),
            Self::Buffer { data, format } => f
                .debug_struct("Buffer")
                .field("len", &data.len())
                .field("format", format)
                .finish(),
            Self::Device(device) => write!(f, "Device({})", device.name()),
        }
    }
}

/// Capture device factory
pub struct CaptureDeviceFactory;

impl CaptureDeviceFactory {
    pub fn create(source: CaptureSource) -> Result<Box<dyn CaptureDevice>> {
        match source {
            CaptureSource::Microphone => {
                #[cfg(feature = "cpal-audio")]
                {
                    let device = super::hardware::CpalCaptureDevice::new()?;
                    Ok(Box::new(device))
                }

                #[cfg(not(feature = "cpal-audio"))]
                {
                    Err(SessionError::Device {
                        message: "microphone capture requires the cpal-audio feature".to_string(),
                    })
                }
            }

            CaptureSource::Buffer { data, format } => {
                Ok(Box::new(ScriptedCaptureDevice::new(data, format)))
            }

            CaptureSource::Device(device) => Ok(device),
        }
    }
}

/// Shared view of a scripted device's lifecycle, for assertions after
/// the device has been moved into a session.
#[derive(Debug, Clone)]
pub struct DeviceProbe {
    capturing: Arc<AtomicBool>,
    start_calls: Arc<AtomicUsize>,
    stop_calls: Arc<AtomicUsize>,
}

impl DeviceProbe {
    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

/// Capture device that replays a prepared encoded stream in chunks.
///
/// Doubles as the test double: failures can be injected at start and
/// stop, and a `DeviceProbe` exposes lifecycle counters.
pub struct ScriptedCaptureDevice {
    data: Vec<u8>,
    format: ClipFormat,
    chunk_size: usize,
    fail_start: bool,
    fail_stop: bool,
    capturing: Arc<AtomicBool>,
    start_calls: Arc<AtomicUsize>,
    stop_calls: Arc<AtomicUsize>,
    feeder: Option<JoinHandle<()>>,
}

impl ScriptedCaptureDevice {
    pub fn new(data: Vec<u8>, format: ClipFormat) -> Self {
        Self {
            data,
            format,
            chunk_size: 4096,
            fail_start: false,
            fail_stop: false,
            capturing: Arc::new(AtomicBool::new(false)),
            start_calls: Arc::new(AtomicUsize::new(0)),
            stop_calls: Arc::new(AtomicUsize::new(0)),
            feeder: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Inject a device-acquisition failure on the next `start`.
    pub fn with_start_failure(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Inject a release failure on the next `stop`.
    pub fn with_stop_failure(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn probe(&self) -> DeviceProbe {
        DeviceProbe {
            capturing: Arc::clone(&self.capturing),
            start_calls: Arc::clone(&self.start_calls),
            stop_calls: Arc::clone(&self.stop_calls),
        }
    }
}

#[async_trait::async_trait]
impl CaptureDevice for ScriptedCaptureDevice {
    async fn start(&mut self, _config: &CaptureConfig) -> Result<mpsc::Receiver<Vec<u8>>> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_start {
            return Err(SessionError::Device {
                message: "scripted device refused to start".to_string(),
            });
        }

        let (tx, rx) = mpsc::channel(32);
        let data = self.data.clone();
        let chunk_size = self.chunk_size;

        self.capturing.store(true, Ordering::SeqCst);
        self.feeder = Some(tokio::spawn(async move {
            for piece in data.chunks(chunk_size) {
                if tx.send(piece.to_vec()).await.is_err() {
                    // Receiver went away; nothing left to feed.
                    break;
                }
            }
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.capturing.store(false, Ordering::SeqCst);

        if let Some(feeder) = self.feeder.take() {
            let _ = feeder.await;
        }

        if self.fail_stop {
            return Err(SessionError::Device {
                message: "scripted device failed to release".to_string(),
            });
        }

        Ok(())
    }

    fn clip_format(&self) -> ClipFormat {
        self.format.clone()
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
