//! Shared accumulation buffer between the capture callback and the streaming
//! scheduler.
//!
//! The capture side appends whole chunks; the scheduler periodically swaps the
//! entire chunk list out for an empty one.  The swap happens under a single
//! short critical section, so a chunk pushed while a drain is in progress
//! lands either in the drained batch or in the next one.  Never both, never
//! neither.
//!
//! ```rust
//! use voice_satellite::audio::SampleBuffer;
//!
//! let buf = SampleBuffer::new();
//! buf.push(vec![0.1, 0.2]);
//! buf.push(vec![0.3]);
//! assert_eq!(buf.drain_concat(), vec![0.1, 0.2, 0.3]);
//! assert!(buf.is_empty());
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// ---------------------------------------------------------------------------
// SampleBuffer
// ---------------------------------------------------------------------------

/// Append-only list of float chunks, drained by swapping.
///
/// Cheap to clone (`Arc` clone); every clone refers to the same storage.
#[derive(Debug, Clone, Default)]
pub struct SampleBuffer {
    chunks: Arc<Mutex<Vec<Vec<f32>>>>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk.  Empty chunks are ignored.
    pub fn push(&self, chunk: Vec<f32>) {
        if chunk.is_empty() {
            return;
        }
        self.lock().push(chunk);
    }

    /// Take every buffered chunk in arrival order, leaving the buffer empty.
    pub fn take(&self) -> Vec<Vec<f32>> {
        std::mem::take(&mut *self.lock())
    }

    /// [`take`](Self::take) and concatenate into one contiguous block.
    pub fn drain_concat(&self) -> Vec<f32> {
        let chunks = self.take();
        let total = chunks.iter().map(Vec::len).sum();
        let mut combined = Vec::with_capacity(total);
        for chunk in &chunks {
            combined.extend_from_slice(chunk);
        }
        combined
    }

    /// Discard all buffered chunks.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.lock().len()
    }

    pub fn sample_count(&self) -> usize {
        self.lock().iter().map(Vec::len).sum()
    }

    // The data is a plain Vec; a panic elsewhere cannot leave it half-written.
    fn lock(&self) -> MutexGuard<'_, Vec<Vec<f32>>> {
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
