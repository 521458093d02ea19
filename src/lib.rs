//! Streaming speech playback.
//!
//! Pulls raw PCM from a remote audio stream in fixed-size chunks on one
//! thread and feeds it to an output device on another, with a guaranteed
//! single completion signal per session.
//!
//! The main entry points are [`Speaker`] for event-driven clients and
//! [`playback::PlaybackSession`] for direct use.

pub mod cli;
pub mod config;
pub mod error;
pub mod playback;
pub mod speaker;
#[cfg(test)]
pub mod test_utils;

pub use error::{Error, Result};
pub use speaker::{ActivityEvent, Speaker};
