pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod language;
pub mod playback;
pub mod services;
pub mod session;
pub mod translation;

pub use audio::{
    AudioClip, AudioOutput, CaptureConfig, CaptureDevice, CaptureSource, ClipFormat, PcmAudio,
    PlaybackEnd, PlaybackHandle,
};
pub use config::Config;
pub use error::{Result, SessionError};
pub use language::{LanguageCode, VoiceProfile};
pub use services::{
    ChatClient, HttpChatClient, HttpSpeechClient, HttpTranscriptionClient, SpeechSynthesisClient,
    TranscriptionClient,
};
pub use session::{PartyRole, SessionCoordinator, SessionOptions, SessionStats, TurnReport};
pub use translation::TranslationPipeline;
