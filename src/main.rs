//! speech-playback - stream raw speech audio to an output device.

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use speech_playback::cli;

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("speech_playback=info".parse()?))
        .init();

    cli::run_command(&args)
}
