//! Session lifecycle: react to the host surface being hidden or shown.
//!
//! ```text
//! Visibility (mpsc) ──▶ VisibilityController::run()
//!        │
//!        ├─ Hidden  → immediate cleanup if mid-interaction
//!        │            → debounced pause (state = Paused, mic track off)
//!        │
//!        └─ Visible → track on, resume sending, pipeline.restart(0)
//! ```

pub mod host;
pub mod visibility;

pub use host::{SessionHost, StateHost};
pub use visibility::{Visibility, VisibilityController, VisibilityState, HIDE_DEBOUNCE};
