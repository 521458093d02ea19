//! Play command.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use super::PlayArgs;
use crate::config::Config;
use crate::error::ResultExt;
use crate::playback::{PullSource, ReadSource};
use crate::speaker::Speaker;

/// Stream a raw PCM file (or stdin) to the output device
pub fn cmd_play(config: Config, args: &PlayArgs) -> anyhow::Result<()> {
    let config = apply_overrides(config, args);
    let format = config.audio.format();
    anyhow::ensure!(format.is_valid(), "invalid stream format: {}", format);

    let source = open_input(&args.input)?;
    let speaker = Speaker::with_default_output(&config);

    println!("Playing {} ({})", args.input.display(), format);
    let handle = speaker.play(source, Some(|| tracing::debug!("Playback complete")))?;

    let report = match args.timeout {
        Some(secs) if secs > 0.0 => match handle.wait_timeout(Duration::from_secs_f64(secs)) {
            Some(report) => report,
            None => {
                println!("Timeout reached, cancelling");
                handle.cancel();
                handle.wait()
            }
        },
        _ => handle.wait(),
    };

    if let Some(err) = &report.device_error {
        eprintln!("Output device problem: {}", err);
    }
    println!(
        "Wrote {} chunks ({} bytes, {:.2}s of audio) in {:.2}s{}",
        report.chunks_written,
        report.bytes_written,
        report.audio_duration(&format).as_secs_f64(),
        report.elapsed.as_secs_f64(),
        if report.cancelled { " [cancelled]" } else { "" }
    );
    Ok(())
}

/// Command-line options take precedence over the config file.
fn apply_overrides(mut config: Config, args: &PlayArgs) -> Config {
    if let Some(rate) = args.sample_rate {
        config.audio.sample_rate = rate;
    }
    if let Some(channels) = args.channels {
        config.audio.channels = channels;
    }
    if let Some(size) = args.buffer_size {
        config.audio.buffer_size = size;
    }
    if let Some(device) = &args.device {
        config.audio.output_device = device.clone();
    }
    if let Some(capacity) = args.queue_capacity {
        config.playback.queue_capacity = capacity;
    }
    config
}

fn open_input(path: &Path) -> crate::Result<Box<dyn PullSource>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(ReadSource::new(std::io::stdin())));
    }
    let file = File::open(path).with_context(format!("Failed to open {}", path.display()))?;
    Ok(Box::new(ReadSource::new(BufReader::new(file))))
}
