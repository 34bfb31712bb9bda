//! Clip decoding and canonical 16-bit PCM WAV encoding.

use crate::audio::device::{AudioClip, ClipFormat};
use crate::audio::output::PcmAudio;
use crate::error::{Result, SessionError};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Canonical encoder output: 16-bit signed interleaved PCM wrapped in a
/// standard 44-byte WAV header, ready for the transcription service.
///
/// Immutable once produced.
#[derive(Debug, Clone)]
pub struct PcmWavBuffer {
    sample_rate: u32,
    channels: u16,
    bytes: Vec<u8>,
}

impl PcmWavBuffer {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Complete container bytes (header plus sample data).
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Number of sample frames in the data section.
    pub fn frames(&self) -> usize {
        self.bytes.len().saturating_sub(44) / (2 * self.channels as usize)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Converts a captured clip into a canonical PCM WAV buffer.
///
/// Encoded containers are decoded at their native sample rate and
/// channel count; no resampling or downmixing happens here. Raw PCM
/// clips are wrapped directly.
pub fn encode(clip: AudioClip) -> Result<PcmWavBuffer> {
    if clip.is_empty() {
        return Err(SessionError::Decode {
            message: "audio clip is empty".to_string(),
        });
    }

    let (samples, sample_rate, channels) = match clip.format {
        ClipFormat::Pcm {
            sample_rate,
            channels,
        } => {
            if sample_rate == 0 || channels == 0 {
                return Err(SessionError::Decode {
                    message: format!(
                        "raw pcm clip declares an invalid format: {}Hz, {} channels",
                        sample_rate, channels
                    ),
                });
            }
            (pcm_bytes_to_samples(&clip.data)?, sample_rate, channels)
        }

        ClipFormat::Encoded { extension_hint } => {
            let decoded = decode_bytes(clip.data, extension_hint.as_deref())?;
            let samples = decoded.samples.iter().map(|&s| sample_to_i16(s)).collect();
            (samples, decoded.sample_rate, decoded.channels)
        }
    };

    let bytes = write_wav(&samples, sample_rate, channels)?;

    debug!(
        "Encoded clip: {} frames, {}Hz, {} channels, {} bytes",
        samples.len() / channels as usize,
        sample_rate,
        channels,
        bytes.len()
    );

    Ok(PcmWavBuffer {
        sample_rate,
        channels,
        bytes,
    })
}

/// Decodes encoded audio bytes into playable PCM through the same
/// decode path `encode` uses. Used by speech playback to normalize
/// synthesized audio.
pub fn decode_to_pcm(data: Vec<u8>, extension_hint: Option<&str>) -> Result<PcmAudio> {
    let decoded = decode_bytes(data, extension_hint)?;
    let samples = decoded.samples.iter().map(|&s| sample_to_i16(s)).collect();
    Ok(PcmAudio {
        sample_rate: decoded.sample_rate,
        channels: decoded.channels,
        samples,
    })
}

struct DecodedAudio {
    sample_rate: u32,
    channels: u16,
    /// Interleaved float samples in source channel order.
    samples: Vec<f32>,
}

fn decode_bytes(data: Vec<u8>, extension_hint: Option<&str>) -> Result<DecodedAudio> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SessionError::Decode {
            message: format!("unrecognized audio container: {}", e),
        })?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SessionError::Decode {
            message: "no decodable audio track".to_string(),
        })?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SessionError::Decode {
            message: format!("unsupported audio codec: {}", e),
        })?;

    let mut sample_rate = 0u32;
    let mut channels = 0u16;
    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(SessionError::Decode {
                    message: format!("failed to read audio packet: {}", e),
                });
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt packet; the decoder can resynchronize on the next one.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => {
                return Err(SessionError::Decode {
                    message: format!("failed to decode audio: {}", e),
                });
            }
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        if sample_buf.is_none() {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    if samples.is_empty() || sample_rate == 0 || channels == 0 {
        return Err(SessionError::Decode {
            message: "clip contains no audio frames".to_string(),
        });
    }

    Ok(DecodedAudio {
        sample_rate,
        channels,
        samples,
    })
}

/// Maps a float sample onto the asymmetric signed 16-bit range.
///
/// Negative samples scale by 32768 and non-negative samples by 32767,
/// so both full-scale peaks are exactly representable. The two
/// constants are intentional and must not be merged.
fn sample_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped < 0.0 {
        (clamped * 32768.0) as i16
    } else {
        (clamped * 32767.0) as i16
    }
}

fn pcm_bytes_to_samples(data: &[u8]) -> Result<Vec<i16>> {
    if data.len() % 2 != 0 {
        return Err(SessionError::Decode {
            message: "raw pcm clip ends with a truncated sample".to_string(),
        });
    }
    Ok(data
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

fn write_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(|e| SessionError::Decode {
        message: format!("could not start wav container: {}", e),
    })?;

    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| SessionError::Decode {
                message: format!("could not write wav sample: {}", e),
            })?;
    }

    writer.finalize().map_err(|e| SessionError::Decode {
        message: format!("could not finalize wav container: {}", e),
    })?;

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_is_asymmetric_at_full_scale() {
        assert_eq!(sample_to_i16(-1.0), -32768);
        assert_eq!(sample_to_i16(1.0), 32767);
        assert_eq!(sample_to_i16(0.0), 0);
    }

    #[test]
    fn test_scale_midrange_values() {
        assert_eq!(sample_to_i16(-0.5), -16384);
        assert_eq!(sample_to_i16(0.5), 16383);
    }

    #[test]
    fn test_scale_clamps_out_of_range() {
        assert_eq!(sample_to_i16(2.0), 32767);
        assert_eq!(sample_to_i16(-3.5), -32768);
        assert_eq!(sample_to_i16(f32::INFINITY), 32767);
        assert_eq!(sample_to_i16(f32::NEG_INFINITY), -32768);
    }

    #[test]
    fn test_encode_empty_clip_fails() {
        let clip = AudioClip {
            format: ClipFormat::wav(),
            data: Vec::new(),
        };
        assert!(matches!(encode(clip), Err(SessionError::Decode { .. })));
    }

    #[test]
    fn test_encode_garbage_container_fails() {
        let clip = AudioClip {
            format: ClipFormat::Encoded {
                extension_hint: None,
            },
            data: vec![0xde, 0xad, 0xbe, 0xef, 0x00, 0x11, 0x22, 0x33],
        };
        assert!(matches!(encode(clip), Err(SessionError::Decode { .. })));
    }

    #[test]
    fn test_encode_truncated_raw_pcm_fails() {
        let clip = AudioClip {
            format: ClipFormat::Pcm {
                sample_rate: 16000,
                channels: 1,
            },
            data: vec![0x01, 0x02, 0x03],
        };
        assert!(matches!(encode(clip), Err(SessionError::Decode { .. })));
    }

    #[test]
    fn test_encode_raw_pcm_header_fields() {
        // Four frames of stereo audio at 8kHz.
        let samples: [i16; 8] = [100, -100, 200, -200, 300, -300, 400, -400];
        let mut data = Vec::new();
        for s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }

        let buffer = encode(AudioClip {
            format: ClipFormat::Pcm {
                sample_rate: 8000,
                channels: 2,
            },
            data,
        })
        .unwrap();

        let bytes = buffer.as_bytes();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");

        // fmt chunk: PCM tag, channels, rate, byte rate, block align, depth.
        assert_eq!(u16::from_le_bytes([bytes[20], bytes[21]]), 1);
        assert_eq!(u16::from_le_bytes([bytes[22], bytes[23]]), 2);
        assert_eq!(
            u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]),
            8000
        );
        assert_eq!(
            u32::from_le_bytes([bytes[28], bytes[29], bytes[30], bytes[31]]),
            8000 * 2 * 2
        );
        assert_eq!(u16::from_le_bytes([bytes[32], bytes[33]]), 4);
        assert_eq!(u16::from_le_bytes([bytes[34], bytes[35]]), 16);

        // data chunk declares frames * channels * 2 bytes.
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(
            u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]),
            4 * 2 * 2
        );

        assert_eq!(buffer.frames(), 4);
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.sample_rate(), 8000);
    }

    #[test]
    fn test_encode_raw_pcm_preserves_samples() {
        let samples: [i16; 4] = [0, 32767, -32768, 1234];
        let mut data = Vec::new();
        for s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }

        let buffer = encode(AudioClip {
            format: ClipFormat::Pcm {
                sample_rate: 16000,
                channels: 1,
            },
            data,
        })
        .unwrap();

        let body = &buffer.as_bytes()[44..];
        let restored: Vec<i16> = body
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        assert_eq!(restored, samples);
    }

    #[test]
    fn test_duration_reflects_frames_and_rate() {
        let data = vec![0u8; 16000 * 2]; // one second of mono 16kHz
        let buffer = encode(AudioClip {
            format: ClipFormat::Pcm {
                sample_rate: 16000,
                channels: 1,
            },
            data,
        })
        .unwrap();
        assert!((buffer.duration_seconds() - 1.0).abs() < 1e-9);
    }
}
