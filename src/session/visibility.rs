//! Visibility state machine.
//!
//! A hidden surface pauses the microphone after [`HIDE_DEBOUNCE`], so quick
//! tab flicks do not thrash the pipeline.  Cleanup of an in-flight
//! interaction is *not* debounced: chat, overlay, continuation state and
//! playback are cleared the moment the surface hides.  Showing the surface
//! resumes at once and restarts the pipeline from the top.
//!
//! The controller counts as paused from the hide signal on, while the
//! realised pause (host state `Paused`, track disabled) waits for the
//! debounce.  A hide→show flick therefore still resumes and restarts the
//! pipeline, but never pauses the mic.
//!
//! Every accepted signal bumps a generation counter.  A debounced pause only
//! runs if no signal arrived since it was scheduled, and both the pause and
//! the resume apply their side effects while holding the state lock, so a
//! show that races a pause waking up always lands after it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::host::SessionHost;
use crate::audio::AudioManager;
use crate::pipeline::{Pipeline, PipelineState};

/// Default delay between a hide signal and the realised pause.
pub const HIDE_DEBOUNCE: Duration = Duration::from_millis(500);

/// Environment signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityState {
    Active,
    Paused,
}

struct ControllerState {
    last: Visibility,
    generation: u64,
    /// Set on hide, cleared on resume.
    paused: bool,
    /// The debounced pause actually ran.
    pause_realized: bool,
    pending_pause: Option<JoinHandle<()>>,
}

struct Inner {
    audio: Arc<AudioManager>,
    pipeline: Arc<dyn Pipeline>,
    host: Arc<dyn SessionHost>,
    debounce: Duration,
    state: Mutex<ControllerState>,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cleanup_if_interacting(&self) {
        let current = self.host.current_state();
        if !current.is_interacting() {
            return;
        }
        log::info!("visibility: hidden during {}, cleaning up", current.label());
        self.host.clear_chat();
        self.host.hide_overlay();
        self.pipeline.clear_continue_state();
        if self.host.is_playing() {
            self.host.stop_playback();
        }
    }

    /// Realise the pause scheduled at `generation`, unless a newer signal
    /// superseded it.
    fn pause(&self, generation: u64) {
        let mut st = self.lock_state();
        if st.generation != generation || st.last != Visibility::Hidden {
            log::debug!("visibility: superseded pause skipped");
            return;
        }
        log::info!("visibility: hidden, pausing mic");
        st.pause_realized = true;
        st.pending_pause = None;

        // Lock stays held until the mic is paused.
        self.host.set_state(PipelineState::Paused);
        self.audio.pause();
    }

    /// Caller holds the state lock for the whole resume.
    fn resume(&self, st: &mut ControllerState) {
        if !st.paused {
            return;
        }
        st.paused = false;
        st.pause_realized = false;

        self.audio.resume();

        if !self.audio.is_streaming() && self.pipeline.is_streaming() {
            let pipeline = Arc::clone(&self.pipeline);
            self.audio.start_sending(move || pipeline.binary_handler_id());
        }

        self.pipeline.reset_for_resume();
        log::info!("visibility: resuming, restarting pipeline");
        self.pipeline.restart(Duration::ZERO);
    }
}

/// Pauses and resumes the session as the host surface hides and shows.
///
/// Cheap to clone; clones share one state machine.
#[derive(Clone)]
pub struct VisibilityController {
    inner: Arc<Inner>,
}

impl VisibilityController {
    pub fn new(
        audio: Arc<AudioManager>,
        pipeline: Arc<dyn Pipeline>,
        host: Arc<dyn SessionHost>,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                audio,
                pipeline,
                host,
                debounce,
                state: Mutex::new(ControllerState {
                    last: Visibility::Visible,
                    generation: 0,
                    paused: false,
                    pause_realized: false,
                    pending_pause: None,
                }),
            }),
        }
    }

    /// Feed one visibility signal.  Repeats of the last signal are ignored.
    ///
    /// Must be called from within a tokio runtime.
    pub fn handle(&self, visibility: Visibility) {
        let mut st = self.inner.lock_state();
        if st.last == visibility {
            log::debug!("visibility: duplicate {visibility:?} ignored");
            return;
        }
        st.last = visibility;
        st.generation += 1;
        if let Some(pending) = st.pending_pause.take() {
            pending.abort();
        }

        match visibility {
            Visibility::Hidden => {
                st.paused = true;
                let inner = Arc::clone(&self.inner);
                let delay = self.inner.debounce;
                let generation = st.generation;
                st.pending_pause = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.pause(generation);
                }));
                drop(st);
                self.inner.cleanup_if_interacting();
            }
            Visibility::Visible => self.inner.resume(&mut st),
        }
    }

    /// Consume signals until the sender side closes.
    pub async fn run(&self, mut rx: mpsc::Receiver<Visibility>) {
        while let Some(visibility) = rx.recv().await {
            self.handle(visibility);
        }
        if let Some(pending) = self.inner.lock_state().pending_pause.take() {
            pending.abort();
        }
        log::info!("visibility: signal channel closed, controller shutting down");
    }

    /// `true` from the hide signal until the next resume.
    pub fn is_paused(&self) -> bool {
        self.inner.lock_state().paused
    }

    /// `Paused` only once the debounced pause has run.
    pub fn state(&self) -> VisibilityState {
        if self.inner.lock_state().pause_realized {
            VisibilityState::Paused
        } else {
            VisibilityState::Active
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use crate::audio::device::MockBackend;
    use crate::audio::{CaptureConstraints, SEND_INTERVAL};
    use crate::transport::{RecordingTransport, Transport};

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    #[derive(Default)]
    struct MockPipeline {
        streaming: AtomicBool,
        clear_continue: AtomicUsize,
        resets: AtomicUsize,
        restarts: AtomicUsize,
    }

    impl Pipeline for MockPipeline {
        fn is_streaming(&self) -> bool {
            self.streaming.load(Ordering::SeqCst)
        }
        fn binary_handler_id(&self) -> Option<u8> {
            Some(3)
        }
        fn clear_continue_state(&self) {
            self.clear_continue.fetch_add(1, Ordering::SeqCst);
        }
        fn reset_for_resume(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
        fn restart(&self, delay: Duration) {
            assert_eq!(delay, Duration::ZERO);
            self.restarts.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct MockHost {
        state: Mutex<PipelineState>,
        transitions: Mutex<Vec<PipelineState>>,
        playing: AtomicBool,
        chat_clears: AtomicUsize,
        overlay_hides: AtomicUsize,
        playback_stops: AtomicUsize,
        /// Signalled when `set_state(Paused)` starts, which then blocks for
        /// the given hold.
        pause_hold: Mutex<Option<(std::sync::mpsc::Sender<()>, Duration)>>,
    }

    impl MockHost {
        fn new(state: PipelineState) -> Self {
            Self {
                state: Mutex::new(state),
                transitions: Mutex::new(Vec::new()),
                playing: AtomicBool::new(false),
                chat_clears: AtomicUsize::new(0),
                overlay_hides: AtomicUsize::new(0),
                playback_stops: AtomicUsize::new(0),
                pause_hold: Mutex::new(None),
            }
        }

        fn hold_pauses(&self, entered: std::sync::mpsc::Sender<()>, hold: Duration) {
            *self.pause_hold.lock().unwrap() = Some((entered, hold));
        }

        fn pauses(&self) -> usize {
            self.transitions
                .lock()
                .unwrap()
                .iter()
                .filter(|s| **s == PipelineState::Paused)
                .count()
        }
    }

    impl SessionHost for MockHost {
        fn current_state(&self) -> PipelineState {
            *self.state.lock().unwrap()
        }
        fn set_state(&self, state: PipelineState) {
            self.transitions.lock().unwrap().push(state);
            if state == PipelineState::Paused {
                let hold = self.pause_hold.lock().unwrap().clone();
                if let Some((entered, hold)) = hold {
                    let _ = entered.send(());
                    std::thread::sleep(hold);
                }
            }
        }
        fn clear_chat(&self) {
            self.chat_clears.fetch_add(1, Ordering::SeqCst);
        }
        fn hide_overlay(&self) {
            self.overlay_hides.fetch_add(1, Ordering::SeqCst);
        }
        fn is_playing(&self) -> bool {
            self.playing.load(Ordering::SeqCst)
        }
        fn stop_playback(&self) {
            self.playing.store(false, Ordering::SeqCst);
            self.playback_stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        controller: VisibilityController,
        audio: Arc<AudioManager>,
        backend: MockBackend,
        pipeline: Arc<MockPipeline>,
        host: Arc<MockHost>,
        transport: Arc<RecordingTransport>,
    }

    fn fixture(state: PipelineState) -> Fixture {
        fixture_with(state, HIDE_DEBOUNCE)
    }

    fn fixture_with(state: PipelineState, debounce: Duration) -> Fixture {
        let backend = MockBackend::new(16_000);
        let transport = Arc::new(RecordingTransport::open());
        let t: Arc<dyn Transport> = transport.clone();
        let audio = Arc::new(AudioManager::new(Arc::new(backend.clone()), t, SEND_INTERVAL));
        audio.start_microphone(&CaptureConstraints::default()).expect("start");

        let pipeline = Arc::new(MockPipeline::default());
        pipeline.streaming.store(true, Ordering::SeqCst);
        audio.start_sending(|| Some(3));

        let host = Arc::new(MockHost::new(state));
        let controller = VisibilityController::new(
            Arc::clone(&audio),
            pipeline.clone(),
            host.clone(),
            debounce,
        );
        Fixture {
            controller,
            audio,
            backend,
            pipeline,
            host,
            transport,
        }
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    // -----------------------------------------------------------------------
    // Hide
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn hide_pauses_after_debounce() {
        let f = fixture(PipelineState::Idle);
        f.controller.handle(Visibility::Hidden);
        assert!(f.controller.is_paused());
        assert_eq!(f.controller.state(), VisibilityState::Active);

        advance(400).await;
        assert_eq!(f.host.pauses(), 0);
        assert!(f.audio.is_streaming());

        advance(200).await;
        assert_eq!(f.host.pauses(), 1);
        assert_eq!(f.controller.state(), VisibilityState::Paused);
        assert!(!f.audio.is_streaming());
        assert_eq!(f.backend.live_handles(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_mic_sends_nothing() {
        let f = fixture(PipelineState::Idle);
        f.controller.handle(Visibility::Hidden);
        advance(600).await;
        let before = f.transport.frames().len();

        f.backend.emit(vec![0.3; 160]);
        advance(500).await;
        assert_eq!(f.transport.frames().len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_hide_does_no_cleanup() {
        let f = fixture(PipelineState::Idle);
        f.controller.handle(Visibility::Hidden);
        advance(600).await;
        assert_eq!(f.host.chat_clears.load(Ordering::SeqCst), 0);
        assert_eq!(f.pipeline.clear_continue.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn interacting_hide_cleans_up_immediately() {
        let f = fixture(PipelineState::Tts);
        f.host.playing.store(true, Ordering::SeqCst);

        f.controller.handle(Visibility::Hidden);

        // Before any time passes.
        assert_eq!(f.host.chat_clears.load(Ordering::SeqCst), 1);
        assert_eq!(f.host.overlay_hides.load(Ordering::SeqCst), 1);
        assert_eq!(f.pipeline.clear_continue.load(Ordering::SeqCst), 1);
        assert_eq!(f.host.playback_stops.load(Ordering::SeqCst), 1);
        assert_eq!(f.host.pauses(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn playback_is_only_stopped_when_playing() {
        let f = fixture(PipelineState::Stt);
        f.controller.handle(Visibility::Hidden);
        assert_eq!(f.host.chat_clears.load(Ordering::SeqCst), 1);
        assert_eq!(f.host.playback_stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn flicker_realises_at_most_one_pause() {
        let f = fixture(PipelineState::Intent);

        f.controller.handle(Visibility::Hidden);
        advance(100).await;
        f.controller.handle(Visibility::Visible);
        advance(100).await;
        f.controller.handle(Visibility::Hidden);
        advance(1_000).await;

        assert_eq!(f.host.pauses(), 1);
        // Cleanup ran once per hide, regardless of debounce.
        assert_eq!(f.host.chat_clears.load(Ordering::SeqCst), 2);
        assert_eq!(f.pipeline.clear_continue.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn show_before_debounce_cancels_pause() {
        let f = fixture(PipelineState::Idle);
        f.controller.handle(Visibility::Hidden);
        advance(200).await;
        f.controller.handle(Visibility::Visible);
        advance(1_000).await;

        assert_eq!(f.host.pauses(), 0);
        assert!(!f.controller.is_paused());
        assert_eq!(f.pipeline.restarts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_hide_is_not_a_new_transition() {
        let f = fixture(PipelineState::Stt);
        f.controller.handle(Visibility::Hidden);
        advance(300).await;
        f.controller.handle(Visibility::Hidden);
        advance(300).await;

        assert_eq!(f.host.chat_clears.load(Ordering::SeqCst), 1);
        assert_eq!(f.host.pauses(), 1);
    }

    // -----------------------------------------------------------------------
    // Show
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn show_after_pause_restarts_pipeline_once() {
        let f = fixture(PipelineState::Idle);
        f.controller.handle(Visibility::Hidden);
        advance(600).await;
        assert!(!f.audio.is_streaming());

        f.controller.handle(Visibility::Visible);

        assert_eq!(f.pipeline.restarts.load(Ordering::SeqCst), 1);
        assert_eq!(f.pipeline.resets.load(Ordering::SeqCst), 1);
        assert!(f.audio.is_streaming());
        assert_eq!(f.controller.state(), VisibilityState::Active);

        // Track re-enabled; audio flows again with a fresh handler id lookup.
        let before = f.transport.frames().len();
        f.backend.emit(vec![0.3; 160]);
        advance(120).await;
        let frames = f.transport.frames();
        assert_eq!(frames.len(), before + 1);
        assert_eq!(frames.last().unwrap()[0], 3);
        assert_eq!(f.backend.acquisitions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sending_not_resumed_when_pipeline_was_not_streaming() {
        let f = fixture(PipelineState::Idle);
        f.controller.handle(Visibility::Hidden);
        advance(600).await;

        f.pipeline.streaming.store(false, Ordering::SeqCst);
        f.controller.handle(Visibility::Visible);

        assert!(!f.audio.is_streaming());
        assert_eq!(f.pipeline.restarts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn show_while_active_is_a_no_op() {
        let f = fixture(PipelineState::Idle);
        f.controller.handle(Visibility::Visible);
        assert_eq!(f.pipeline.restarts.load(Ordering::SeqCst), 0);
        assert_eq!(f.pipeline.resets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_consumes_signals_until_closed() {
        let f = fixture(PipelineState::Idle);
        let (tx, rx) = mpsc::channel(4);
        let controller = f.controller.clone();
        let task = tokio::spawn(async move { controller.run(rx).await });

        tx.send(Visibility::Hidden).await.unwrap();
        advance(600).await;
        assert_eq!(f.host.pauses(), 1);

        tx.send(Visibility::Visible).await.unwrap();
        drop(tx);
        task.await.expect("run task");

        assert_eq!(f.pipeline.restarts.load(Ordering::SeqCst), 1);
        assert!(!f.controller.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn closing_the_channel_cancels_a_pending_pause() {
        let f = fixture(PipelineState::Idle);
        let (tx, rx) = mpsc::channel(4);
        let controller = f.controller.clone();
        let task = tokio::spawn(async move { controller.run(rx).await });

        tx.send(Visibility::Hidden).await.unwrap();
        drop(tx);
        task.await.expect("run task");
        advance(1_000).await;

        assert_eq!(f.host.pauses(), 0);
    }

    // -----------------------------------------------------------------------
    // Races (real threads)
    // -----------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn show_racing_a_waking_pause_leaves_the_mic_running() {
        let f = fixture_with(PipelineState::Idle, Duration::from_millis(20));
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        f.host.hold_pauses(entered_tx, Duration::from_millis(100));

        f.controller.handle(Visibility::Hidden);
        // The pause task is now inside set_state(Paused).
        entered_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("pause task started");
        f.controller.handle(Visibility::Visible);

        assert!(!f.controller.is_paused());
        assert_eq!(f.controller.state(), VisibilityState::Active);
        assert!(f.audio.is_streaming());
        assert_eq!(f.pipeline.restarts.load(Ordering::SeqCst), 1);

        f.backend.emit(vec![0.3; 160]);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!f.transport.frames().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn superseded_pause_never_runs() {
        let f = fixture_with(PipelineState::Idle, Duration::from_millis(20));
        for _ in 0..50 {
            f.controller.handle(Visibility::Hidden);
            f.controller.handle(Visibility::Visible);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(f.host.pauses(), 0);
        assert!(f.audio.is_streaming());
        assert_eq!(f.controller.state(), VisibilityState::Active);
    }
}
