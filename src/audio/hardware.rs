//! Real microphone capture and speaker output using CPAL.
//!
//! Only compiled with the `cpal-audio` feature. Capture runs at the
//! device's native format; the encoder wraps whatever rate and channel
//! count the device delivers, so no conversion happens here.

use crate::audio::device::{CaptureConfig, CaptureDevice, ClipFormat};
use crate::audio::output::{AudioOutput, PcmAudio, PlaybackEnd, PlaybackHandle};
use crate::error::{Result, SessionError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched from one place at a time, behind
/// the owning device's Mutex; its methods never cross thread
/// boundaries unsafely.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Microphone capture via the default CPAL input device.
///
/// Emits chunks of raw interleaved little-endian i16 PCM at the
/// device's native rate and channel count.
pub struct CpalCaptureDevice {
    device: cpal::Device,
    stream: Mutex<Option<SendableStream>>,
    buffer: Arc<Mutex<Vec<i16>>>,
    capturing: Arc<AtomicBool>,
    format: Mutex<ClipFormat>,
    drainer: Option<JoinHandle<()>>,
}

impl CpalCaptureDevice {
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| SessionError::Device {
                message: "no input device available".to_string(),
            })?;

        Ok(Self {
            device,
            stream: Mutex::new(None),
            buffer: Arc::new(Mutex::new(Vec::new())),
            capturing: Arc::new(AtomicBool::new(false)),
            format: Mutex::new(ClipFormat::Pcm {
                sample_rate: 16000,
                channels: 1,
            }),
            drainer: None,
        })
    }

    fn build_stream(&self) -> Result<(cpal::Stream, u32, u16)> {
        let default_config =
            self.device
                .default_input_config()
                .map_err(|e| SessionError::Device {
                    message: format!("failed to query input config: {}", e),
                })?;

        let native_rate = default_config.sample_rate().0;
        let native_channels = default_config.channels();
        let stream_config: cpal::StreamConfig = default_config.clone().into();

        let err_callback = |err| {
            warn!("Audio input stream error: {}", err);
        };

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::I16 => {
                let buffer = Arc::clone(&self.buffer);
                self.device
                    .build_input_stream(
                        &stream_config,
                        move |data: &[i16], _: &cpal::InputCallbackInfo| {
                            if let Ok(mut buf) = buffer.lock() {
                                buf.extend_from_slice(data);
                            }
                        },
                        err_callback,
                        None,
                    )
                    .map_err(|e| SessionError::Device {
                        message: format!("failed to build i16 input stream: {}", e),
                    })?
            }
            cpal::SampleFormat::F32 => {
                let buffer = Arc::clone(&self.buffer);
                self.device
                    .build_input_stream(
                        &stream_config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            if let Ok(mut buf) = buffer.lock() {
                                buf.extend(
                                    data.iter()
                                        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                                );
                            }
                        },
                        err_callback,
                        None,
                    )
                    .map_err(|e| SessionError::Device {
                        message: format!("failed to build f32 input stream: {}", e),
                    })?
            }
            fmt => {
                return Err(SessionError::Device {
                    message: format!("unsupported native sample format: {:?}", fmt),
                });
            }
        };

        Ok((stream, native_rate, native_channels))
    }
}

#[async_trait::async_trait]
impl CaptureDevice for CpalCaptureDevice {
    async fn start(&mut self, config: &CaptureConfig) -> Result<mpsc::Receiver<Vec<u8>>> {
        if self.capturing.load(Ordering::SeqCst) {
            return Err(SessionError::Device {
                message: "capture already running".to_string(),
            });
        }

        if config.echo_cancellation || config.noise_suppression {
            // CPAL exposes no processing controls; PipeWire/CoreAudio
            // may still apply their own.
            debug!("Echo cancellation / noise suppression left to the platform");
        }

        let (stream, sample_rate, channels) = self.build_stream()?;
        stream.play().map_err(|e| SessionError::Device {
            message: format!("failed to start input stream: {}", e),
        })?;

        if let Ok(mut format) = self.format.lock() {
            *format = ClipFormat::Pcm {
                sample_rate,
                channels,
            };
        }
        if let Ok(mut guard) = self.stream.lock() {
            *guard = Some(SendableStream(stream));
        }
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
        self.capturing.store(true, Ordering::SeqCst);

        debug!(
            "Microphone capture started: {}Hz, {} channels",
            sample_rate, channels
        );

        let (tx, rx) = mpsc::channel(32);
        let buffer = Arc::clone(&self.buffer);
        let capturing = Arc::clone(&self.capturing);

        self.drainer = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(100));
            loop {
                interval.tick().await;

                let drained: Vec<i16> = match buffer.lock() {
                    Ok(mut buf) => buf.drain(..).collect(),
                    Err(_) => break,
                };

                if !drained.is_empty() {
                    let mut bytes = Vec::with_capacity(drained.len() * 2);
                    for sample in drained {
                        bytes.extend_from_slice(&sample.to_le_bytes());
                    }
                    if tx.send(bytes).await.is_err() {
                        break;
                    }
                }

                if !capturing.load(Ordering::SeqCst) {
                    break;
                }
            }
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Ok(mut guard) = self.stream.lock() {
            if let Some(stream) = guard.take() {
                if let Err(e) = stream.0.pause() {
                    warn!("Failed to pause input stream: {}", e);
                }
            }
        }

        self.capturing.store(false, Ordering::SeqCst);
        if let Some(drainer) = self.drainer.take() {
            let _ = drainer.await;
        }

        debug!("Microphone capture stopped");
        Ok(())
    }

    fn clip_format(&self) -> ClipFormat {
        self.format
            .lock()
            .map(|format| format.clone())
            .unwrap_or(ClipFormat::Pcm {
                sample_rate: 16000,
                channels: 1,
            })
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

/// Speaker output via the default CPAL output device.
pub struct CpalAudioOutput {
    device: cpal::Device,
}

impl CpalAudioOutput {
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| SessionError::Playback {
                message: "no output device available".to_string(),
            })?;
        Ok(Self { device })
    }
}

#[async_trait::async_trait]
impl AudioOutput for CpalAudioOutput {
    async fn begin(&self, audio: PcmAudio) -> Result<PlaybackHandle> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        // cpal streams are not Send, so the whole run lives on a
        // dedicated thread and reports back through channels.
        let device = self.device.clone();
        std::thread::spawn(move || {
            playback_thread(device, audio, ready_tx, stop_rx, done_tx);
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(PlaybackHandle::new(stop_tx, done_rx)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SessionError::Playback {
                message: "playback thread exited before starting".to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

fn playback_thread(
    device: cpal::Device,
    audio: PcmAudio,
    ready_tx: oneshot::Sender<Result<()>>,
    mut stop_rx: oneshot::Receiver<()>,
    done_tx: oneshot::Sender<PlaybackEnd>,
) {
    let sample_rate = audio.sample_rate;
    let channels = audio.channels;
    let samples: Arc<Vec<i16>> = Arc::new(audio.samples);
    let position = Arc::new(AtomicUsize::new(0));
    let total = samples.len();

    let stream = match build_output_stream(
        &device,
        Arc::clone(&samples),
        Arc::clone(&position),
        sample_rate,
        channels,
    ) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        // A refusal to start is the blocked-output condition.
        let _ = ready_tx.send(Err(SessionError::PlaybackBlocked {
            message: format!("output device refused to start: {}", e),
        }));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    let end = loop {
        if position.load(Ordering::SeqCst) >= total {
            // Let the device drain its last buffer before pausing.
            std::thread::sleep(Duration::from_millis(150));
            break PlaybackEnd::Completed;
        }

        match stop_rx.try_recv() {
            Ok(()) => break PlaybackEnd::Stopped,
            Err(oneshot::error::TryRecvError::Closed) => break PlaybackEnd::Stopped,
            Err(oneshot::error::TryRecvError::Empty) => {
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    };

    if let Err(e) = stream.pause() {
        warn!("Failed to pause output stream: {}", e);
    }
    drop(stream);

    let _ = done_tx.send(end);
}

fn build_output_stream(
    device: &cpal::Device,
    samples: Arc<Vec<i16>>,
    position: Arc<AtomicUsize>,
    sample_rate: u32,
    channels: u16,
) -> Result<cpal::Stream> {
    let config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let err_callback = |err| {
        warn!("Audio output stream error: {}", err);
    };

    // Try i16 output first, then fall back to f32 conversion.
    {
        let samples = Arc::clone(&samples);
        let position = Arc::clone(&position);
        if let Ok(stream) = device.build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                fill_i16(&samples, &position, data);
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }
    }

    device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let start = position.fetch_add(data.len(), Ordering::SeqCst);
                for (i, slot) in data.iter_mut().enumerate() {
                    *slot = samples
                        .get(start + i)
                        .map(|&s| s as f32 / 32768.0)
                        .unwrap_or(0.0);
                }
            },
            err_callback,
            None,
        )
        .map_err(|e| SessionError::Playback {
            message: format!("failed to build output stream: {}", e),
        })
}

fn fill_i16(samples: &Arc<Vec<i16>>, position: &Arc<AtomicUsize>, data: &mut [i16]) {
    let start = position.fetch_add(data.len(), Ordering::SeqCst);
    for (i, slot) in data.iter_mut().enumerate() {
        *slot = samples.get(start + i).copied().unwrap_or(0);
    }
}
