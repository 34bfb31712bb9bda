pub mod player;

pub use player::SpeechPlayback;
