//! Device listing and configuration display.

use std::path::Path;

use crate::config::{self, Config};
use crate::playback::{default_output_device, list_output_devices};

/// List output devices, marking the default
pub fn cmd_devices() -> anyhow::Result<()> {
    let devices = list_output_devices();
    if devices.is_empty() {
        println!("No output devices found.");
        return Ok(());
    }

    let default = default_output_device();
    println!("Output devices:");
    for name in devices {
        let marker = if default.as_deref() == Some(name.as_str()) { "*" } else { " " };
        println!(" {} {}", marker, name);
    }
    Ok(())
}

/// Print the config path and effective configuration
pub fn cmd_config(config: &Config, path: Option<&Path>, save: bool) -> anyhow::Result<()> {
    let path = path.map(Path::to_path_buf).or_else(config::config_path);
    match &path {
        Some(p) => println!("# Config file: {}", p.display()),
        None => println!("# Config file: <no config directory>"),
    }
    println!("# Stream format: {}\n", config.audio.format());
    print!("{}", toml::to_string_pretty(config)?);

    if save {
        let path = path.ok_or(config::ConfigError::NoConfigDir)?;
        config::save_to(config, &path)?;
        println!("\nSaved to {}", path.display());
    }
    Ok(())
}
