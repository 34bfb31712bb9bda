//! Error types for med-interpreter.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    // Capture errors
    #[error("Microphone unavailable: {message}")]
    Device { message: String },

    #[error("Audio decode failed: {message}")]
    Decode { message: String },

    // Remote service errors
    #[error("Transcription failed: {message}")]
    Transcription { message: String },

    #[error("Translation failed: {message}")]
    Translation { message: String },

    // Playback errors
    #[error("Speech playback failed: {message}")]
    Playback { message: String },

    /// The output device refused to start playback (busy or denied).
    /// Expected and non-fatal; the session continues.
    #[error("Speech playback blocked: {message}")]
    PlaybackBlocked { message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, SessionError>;
