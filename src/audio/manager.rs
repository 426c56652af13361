//! Microphone + streaming facade used by the session layer.
//!
//! [`AudioManager`] pairs one [`CaptureEngine`] with one
//! [`StreamingScheduler`] over a shared [`SampleBuffer`], and enforces the
//! teardown order timer → graph → device.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::buffer::SampleBuffer;
use super::capture::{CaptureConstraints, CaptureEngine, CaptureSettings, DeviceError};
use super::device::AudioBackend;
use super::stream::{HandlerIdProvider, StreamingScheduler};
use crate::transport::Transport;

pub struct AudioManager {
    engine: Mutex<CaptureEngine>,
    scheduler: StreamingScheduler,
}

impl AudioManager {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        transport: Arc<dyn Transport>,
        send_interval: Duration,
    ) -> Self {
        let buffer = SampleBuffer::new();
        Self {
            engine: Mutex::new(CaptureEngine::new(backend, buffer.clone())),
            scheduler: StreamingScheduler::new(buffer, transport, send_interval),
        }
    }

    /// Start a fresh capture session, tearing down any previous one first.
    ///
    /// Blocks while the platform opens the device; call it from
    /// `spawn_blocking` inside async code.
    pub fn start_microphone(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<CaptureSettings, DeviceError> {
        self.scheduler.stop_sending();
        let settings = self.lock_engine().start(constraints)?;
        self.scheduler.set_source_rate(settings.sample_rate);

        if log::log_enabled!(log::Level::Debug) {
            match serde_json::to_string(&settings) {
                Ok(json) => log::debug!("mic: track settings {json}"),
                Err(e) => log::debug!("mic: cannot serialise track settings: {e}"),
            }
        }
        Ok(settings)
    }

    /// Stop sending, disconnect the graph, release the device.  Safe in any
    /// state.
    pub fn stop_microphone(&self) {
        self.scheduler.stop_sending();
        self.lock_engine().stop();
    }

    /// Must be called from within a tokio runtime.
    pub fn start_sending<F>(&self, handler_id: F)
    where
        F: Fn() -> Option<u8> + Send + Sync + 'static,
    {
        let provider: HandlerIdProvider = Arc::new(handler_id);
        self.scheduler.start_sending(provider);
    }

    pub fn stop_sending(&self) {
        self.scheduler.stop_sending();
    }

    pub fn is_streaming(&self) -> bool {
        self.scheduler.is_streaming()
    }

    /// Stop sending and disable the track.  The device stays open.
    pub fn pause(&self) {
        self.scheduler.stop_sending();
        self.lock_engine().pause();
    }

    /// Re-enable the track.  Sending is restarted by the caller.
    pub fn resume(&self) {
        self.lock_engine().resume();
    }

    pub fn is_capturing(&self) -> bool {
        self.lock_engine().is_active()
    }

    pub fn settings(&self) -> Option<CaptureSettings> {
        self.lock_engine().settings().cloned()
    }

    fn lock_engine(&self) -> MutexGuard<'_, CaptureEngine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
