//! Two-party translation session orchestration
//!
//! This module provides the `SessionCoordinator` abstraction that manages:
//! - Two independent capture lanes (provider, patient)
//! - The single-active-speaker rule, with graceful preemption
//! - Routing of translated turns into the counterpart's transcript
//! - Cancellable per-party speech playback
//! - Session statistics and state snapshots

mod config;
mod coordinator;
mod state;

pub use config::SessionOptions;
pub use coordinator::SessionCoordinator;
pub use state::{PartyRole, SessionStats, TurnReport};
