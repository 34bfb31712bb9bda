pub mod device;
pub mod encoder;
pub mod output;

#[cfg(feature = "cpal-audio")]
pub mod hardware;

pub use device::{
    AudioClip, CaptureConfig, CaptureDevice, CaptureDeviceFactory, CaptureSource, ClipFormat,
    ScriptedCaptureDevice,
};
pub use encoder::{decode_to_pcm, encode, PcmWavBuffer};
pub use output::{
    AudioOutput, AudioOutputFactory, MockAudioOutput, PcmAudio, PlaybackEnd, PlaybackHandle,
};
