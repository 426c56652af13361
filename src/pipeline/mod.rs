//! Pipeline collaborator: the server-driven wake word → STT → intent → TTS
//! conversation the satellite streams audio into.
//!
//! The audio core and session controller only see the [`Pipeline`] trait.
//! [`FixedChannelPipeline`] is the minimal implementation used by the
//! binary: it streams on a handler id taken from configuration.

pub mod fixed;
pub mod state;

use std::time::Duration;

pub use fixed::FixedChannelPipeline;
pub use state::{new_shared_state, AppState, PipelineState, SharedState};

/// What the session controller needs from the conversational pipeline.
pub trait Pipeline: Send + Sync {
    /// `true` while the pipeline expects audio frames.
    fn is_streaming(&self) -> bool;

    /// Current binary handler id, if a channel is negotiated.
    fn binary_handler_id(&self) -> Option<u8>;

    /// Forget any pending follow-up turn of a multi-turn conversation.
    fn clear_continue_state(&self);

    /// Reset retry/error bookkeeping before a resume restart.
    fn reset_for_resume(&self);

    /// Restart from the beginning after `delay`.
    fn restart(&self, delay: Duration);
}

// Compile-time assertion: Arc<dyn Pipeline> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: std::sync::Arc<dyn Pipeline>) {}
};
