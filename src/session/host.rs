//! The UI host as seen from the session controller.

use std::sync::{MutexGuard, PoisonError};

use crate::pipeline::{AppState, PipelineState, SharedState};

/// Lifecycle callbacks the controller issues to whatever shows the session.
pub trait SessionHost: Send + Sync {
    fn current_state(&self) -> PipelineState;
    fn set_state(&self, state: PipelineState);
    fn clear_chat(&self);
    fn hide_overlay(&self);
    /// Response audio is playing.
    fn is_playing(&self) -> bool;
    fn stop_playback(&self);
}

/// [`SessionHost`] over the shared [`AppState`].
#[derive(Clone)]
pub struct StateHost {
    state: SharedState,
}

impl StateHost {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    fn lock(&self) -> MutexGuard<'_, AppState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionHost for StateHost {
    fn current_state(&self) -> PipelineState {
        self.lock().pipeline
    }

    fn set_state(&self, state: PipelineState) {
        let mut st = self.lock();
        if st.pipeline != state {
            log::info!("state: {} -> {}", st.pipeline.label(), state.label());
            st.pipeline = state;
        }
    }

    fn clear_chat(&self) {
        self.lock().chat.clear();
    }

    fn hide_overlay(&self) {
        self.lock().overlay_visible = false;
    }

    fn is_playing(&self) -> bool {
        self.lock().playing
    }

    fn stop_playback(&self) {
        self.lock().playing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::new_shared_state;

    #[test]
    fn callbacks_update_shared_state() {
        let state = new_shared_state();
        {
            let mut st = state.lock().unwrap();
            st.chat.push("turn on the lights".into());
            st.overlay_visible = true;
            st.playing = true;
        }
        let host = StateHost::new(state.clone());

        host.set_state(PipelineState::Tts);
        assert_eq!(host.current_state(), PipelineState::Tts);
        assert!(host.is_playing());

        host.clear_chat();
        host.hide_overlay();
        host.stop_playback();

        let st = state.lock().unwrap();
        assert!(st.chat.is_empty());
        assert!(!st.overlay_visible);
        assert!(!st.playing);
    }
}
