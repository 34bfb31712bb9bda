use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two session participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyRole {
    Provider,
    Patient,
}

impl PartyRole {
    /// The counterpart receiving this party's translations.
    pub fn other(&self) -> PartyRole {
        match self {
            PartyRole::Provider => PartyRole::Patient,
            PartyRole::Patient => PartyRole::Provider,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PartyRole::Provider => "provider",
            PartyRole::Patient => "patient",
        }
    }
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one completed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    /// Who spoke
    pub party: PartyRole,

    /// What the transcription service heard
    pub transcript: String,

    /// What was written to the counterpart's transcript, if anything
    pub translation: Option<String>,
}

/// Snapshot of a session's state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Unique session identifier
    pub session_id: String,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Elapsed wall-clock seconds
    pub duration_secs: f64,

    /// Number of completed capture turns
    pub turns_completed: usize,

    /// Party currently recording, if any
    pub active_speaker: Option<PartyRole>,

    /// Whether the provider's playback lane is speaking
    pub provider_speaking: bool,

    /// Whether the patient's playback lane is speaking
    pub patient_speaking: bool,
}
