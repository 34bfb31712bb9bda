//! Clients for the three remote AI services
//!
//! Each contract is a trait with one HTTP implementation and one
//! scriptable mock:
//! - transcription: audio in, recognized text out
//! - chat: ordered turns in, completion text out
//! - speech: text in, synthesized audio out (four response shapes)

pub mod chat;
pub mod speech;
pub mod transcription;

pub use chat::{ChatClient, ChatTurn, HttpChatClient, MockChatClient};
pub use speech::{HttpSpeechClient, MockSpeechClient, SpeechSynthesisClient, SynthesisAudio};
pub use transcription::{HttpTranscriptionClient, MockTranscriptionClient, TranscriptionClient};

/// First part of a response body, for error messages.
pub(crate) fn body_snippet(body: &str) -> String {
    const LIMIT: usize = 200;
    if body.chars().count() <= LIMIT {
        body.to_string()
    } else {
        let cut: String = body.chars().take(LIMIT).collect();
        format!("{}...", cut)
    }
}
