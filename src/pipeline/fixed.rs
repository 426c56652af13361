//! Single-channel pipeline: streams on one configured handler id.
//!
//! Wake word, STT and intent all happen server-side; this side only keeps the
//! audio flowing on the agreed channel and resets to [`PipelineState::Idle`]
//! on every (re)start.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::{Pipeline, PipelineState};
use crate::audio::AudioManager;
use crate::session::SessionHost;

struct Inner {
    handler_id: Option<u8>,
    audio: Arc<AudioManager>,
    host: Arc<dyn SessionHost>,
    streaming: AtomicBool,
    starts: AtomicUsize,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn begin(&self) {
        self.host.set_state(PipelineState::Idle);
        let handler_id = self.handler_id;
        self.audio.start_sending(move || handler_id);
        self.streaming.store(true, Ordering::SeqCst);
        let n = self.starts.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!("pipeline: streaming on handler {handler_id:?} (start #{n})");
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct FixedChannelPipeline {
    inner: Arc<Inner>,
}

impl FixedChannelPipeline {
    pub fn new(
        handler_id: Option<u8>,
        audio: Arc<AudioManager>,
        host: Arc<dyn SessionHost>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                handler_id,
                audio,
                host,
                streaming: AtomicBool::new(false),
                starts: AtomicUsize::new(0),
                pending: Mutex::new(None),
            }),
        }
    }

    /// Cancel any pending restart and stop sending.
    pub fn stop(&self) {
        if let Some(pending) = self.inner.lock_pending().take() {
            pending.abort();
        }
        self.inner.audio.stop_sending();
        self.inner.streaming.store(false, Ordering::SeqCst);
    }

    /// Number of times the pipeline has (re)started streaming.
    pub fn starts(&self) -> usize {
        self.inner.starts.load(Ordering::SeqCst)
    }
}

impl Pipeline for FixedChannelPipeline {
    fn is_streaming(&self) -> bool {
        self.inner.streaming.load(Ordering::SeqCst)
    }

    fn binary_handler_id(&self) -> Option<u8> {
        self.inner.handler_id
    }

    // One fixed channel, no multi-turn follow-ups to forget.
    fn clear_continue_state(&self) {
        log::debug!("pipeline: no continuation state on a fixed channel");
    }

    fn reset_for_resume(&self) {
        if let Some(pending) = self.inner.lock_pending().take() {
            pending.abort();
        }
    }

    /// Must be called from within a tokio runtime.
    fn restart(&self, delay: Duration) {
        self.stop();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            inner.begin();
        });
        *self.inner.lock_pending() = Some(task);
    }
}

impl Drop for FixedChannelPipeline {
    fn drop(&mut self) {
        if let Some(pending) = self.inner.lock_pending().take() {
            pending.abort();
        }
    }
}
