//! Command-line interface for speech-playback.
//!
//! Plays raw PCM files or stdin through the same pipeline the dialog
//! client uses, and inspects output devices and configuration.

mod commands;

pub use commands::{Cli, Commands, PlayArgs, run_command};
