//! Voice satellite: microphone capture streamed as 16 kHz PCM frames to a
//! conversational voice server, paused and resumed with host visibility.

pub mod audio;
pub mod config;
pub mod logging;
pub mod pipeline;
pub mod session;
pub mod transport;
