mod command;
mod config;
mod daemon;

use anyhow::{Context, Result};
use embedded_hal_bus::i2c::RefCellDevice;
use linux_embedded_hal::I2cdev;
use log::{error, info};
use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use tokio::signal::unix::{signal, SignalKind};
use trellis_keypad::Trellis;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    init_logger();

    // Parse command line arguments
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/trellis-daemon/config.yaml".to_string());

    info!("Trellis keypad daemon starting...");
    info!("Loading configuration from: {}", config_path);

    let config = load_config(&config_path)?;
    info!("Configuration loaded successfully");

    // Validate I2C device
    let i2c_device_path = &config.i2c.device;
    if !PathBuf::from(i2c_device_path).exists() {
        error!("I2C device not found: {}", i2c_device_path);
        return Err(anyhow::anyhow!("I2C device not found: {}", i2c_device_path));
    }

    // Every board gets its own handle on the one bus; each transaction borrows it in turn
    let bus = RefCell::new(
        I2cdev::new(i2c_device_path)
            .context(format!("Failed to open I2C device: {}", i2c_device_path))?,
    );
    let boards = config
        .boards
        .iter()
        .map(|board| Trellis::shared(RefCellDevice::new(&bus), board.address))
        .collect();

    let mut daemon = daemon::Daemon::new(config, boards).context("Failed to initialize keypad")?;

    // Setup signal handling via tokio
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to setup SIGHUP handler")?;

    info!("Daemon started successfully");

    loop {
        tokio::select! {
            result = daemon.poll() => {
                if let Err(e) = result {
                    error!("Daemon poll error: {:#}", e);
                    return Err(e);
                }
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully");
                break;
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading configuration");
                match load_config(&config_path) {
                    Ok(new_config) => {
                        if let Err(e) = daemon.reload_config(new_config) {
                            error!("Configuration not reloaded: {:#}", e);
                        }
                    }
                    Err(e) => error!("Configuration not reloaded: {:#}", e),
                }
            }
        }
    }

    daemon.shutdown().context("Failed to blank keypad")?;
    info!("Trellis keypad daemon shutdown complete");
    Ok(())
}

fn load_config(path: &str) -> Result<config::Config> {
    let content =
        fs::read_to_string(path).context(format!("Failed to read config file: {}", path))?;
    let config: config::Config =
        serde_yaml::from_str(&content).context("Failed to parse configuration file")?;
    config.validate()?;
    Ok(config)
}

fn init_logger() {
    // Use `env_logger` for logging. Systemd/journald will capture stdout/stderr.
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();
}
