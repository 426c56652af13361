//! Conversational pipeline states and shared application state.
//!
//! [`PipelineState`] mirrors the phases the voice server walks through.  The
//! session controller only cares whether a state is *interacting*: a hide
//! during those phases needs immediate UI/audio cleanup.
//!
//! [`SharedState`] is a type alias for `Arc<Mutex<AppState>>`, cheap to clone
//! and safe to share across threads.

use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// PipelineState
// ---------------------------------------------------------------------------

/// Phases of the voice pipeline.
///
/// ```text
/// Idle ──wake word──▶ WakeWordDetected ──▶ Stt ──▶ Intent ──▶ Tts ──▶ Idle
/// any ──surface hidden (debounced)──▶ Paused ──visible──▶ Idle (restart)
/// any ──error──▶ Error
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PipelineState {
    /// Streaming audio, waiting for the wake word.
    #[default]
    Idle,
    WakeWordDetected,
    /// Speech-to-text in progress.
    Stt,
    /// Intent recognition in progress.
    Intent,
    /// Response audio is playing.
    Tts,
    /// Microphone paused because the surface is hidden.
    Paused,
    Error,
}

impl PipelineState {
    /// `true` for the phases in which the user is mid-conversation.
    ///
    /// ```
    /// use voice_satellite::pipeline::PipelineState;
    ///
    /// assert!(PipelineState::Stt.is_interacting());
    /// assert!(!PipelineState::Idle.is_interacting());
    /// ```
    pub fn is_interacting(&self) -> bool {
        matches!(
            self,
            PipelineState::WakeWordDetected
                | PipelineState::Stt
                | PipelineState::Intent
                | PipelineState::Tts
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::WakeWordDetected => "Wake word",
            PipelineState::Stt => "Listening",
            PipelineState::Intent => "Processing",
            PipelineState::Tts => "Responding",
            PipelineState::Paused => "Paused",
            PipelineState::Error => "Error",
        }
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// What the host surface shows.  Mutated by the session host, read by
/// whoever renders it.
pub struct AppState {
    pub pipeline: PipelineState,
    /// Chat lines currently on screen.
    pub chat: Vec<String>,
    pub overlay_visible: bool,
    /// Response audio is playing.
    pub playing: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            pipeline: PipelineState::Idle,
            chat: Vec::new(),
            overlay_visible: false,
            playing: false,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`AppState`].  Do not hold the lock across `.await`.
pub type SharedState = Arc<Mutex<AppState>>;

pub fn new_shared_state() -> SharedState {
    Arc::new(Mutex::new(AppState::new()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
