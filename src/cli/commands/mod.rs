//! CLI command definitions and dispatch.
//!
//! Each subcommand lives in its own submodule:
//! - `play`: stream a raw PCM file or stdin to the output device
//! - `devices`: list output devices and show effective configuration

mod devices;
mod play;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub use devices::{cmd_config, cmd_devices};
pub use play::cmd_play;

/// speech-playback CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: OS config directory)
    #[arg(long, global = true, env = "SPEECH_PLAYBACK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Play raw s16le PCM from a file or stdin ("-")
    Play(PlayArgs),
    /// List audio output devices
    Devices,
    /// Show config path and effective configuration
    Config {
        /// Write the effective configuration back to disk
        #[arg(long)]
        save: bool,
    },
}

/// Options for `play`. Unset options fall back to the config file.
#[derive(Args, Debug, Clone)]
pub struct PlayArgs {
    /// Input file, or "-" for stdin
    pub input: PathBuf,
    /// Stream sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,
    /// Stream channel count
    #[arg(long)]
    pub channels: Option<u16>,
    /// Chunk size in bytes (0 = derive from format)
    #[arg(long)]
    pub buffer_size: Option<usize>,
    /// Output device name (substring match)
    #[arg(short, long)]
    pub device: Option<String>,
    /// Chunks buffered between reader and player (0 = unbounded)
    #[arg(long)]
    pub queue_capacity: Option<usize>,
    /// Cancel playback after this many seconds
    #[arg(long)]
    pub timeout: Option<f64>,
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => crate::config::load_from(path),
        None => crate::config::load(),
    };

    match &cli.command {
        Commands::Play(args) => cmd_play(config, args),
        Commands::Devices => cmd_devices(),
        Commands::Config { save } => cmd_config(&config, cli.config.as_deref(), *save),
    }
}
