use crate::command::CommandExecutor;
use crate::config::{Config, LedMode};
use anyhow::{anyhow, Result};
use embedded_hal::i2c::I2c;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::sleep;
use trellis_keypad::{SharedTrellis, TrellisSet};

pub struct Daemon<I2C> {
    keypad: TrellisSet<I2C>,
    config: Config,
}

impl<I2C> Daemon<I2C>
where
    I2C: I2c,
    I2C::Error: Send + Sync + 'static,
{
    /// `boards` must be in the same order as `config.boards`.
    pub fn new(config: Config, boards: Vec<SharedTrellis<I2C>>) -> Result<Self> {
        if boards.len() != config.boards.len() {
            return Err(anyhow!(
                "{} board(s) given for {} configured",
                boards.len(),
                config.boards.len()
            ));
        }
        let keypad = TrellisSet::new(boards)?;

        info!("Polling interval: {}ms", config.polling.interval_ms);
        info!("Monitoring {} key(s), LED mode {:?}", keypad.led_count(), config.led_mode);

        let daemon = Daemon { keypad, config };
        daemon.init()?;
        Ok(daemon)
    }

    fn init(&self) -> Result<()> {
        for board in self.keypad.boards() {
            board.borrow_mut().init()?;
        }
        self.apply_config()?;

        self.keypad.fill(false);
        self.keypad.show()?;
        Ok(())
    }

    fn apply_config(&self) -> Result<()> {
        for (board, board_config) in self.keypad.boards().iter().zip(&self.config.boards) {
            let mut trellis = board.borrow_mut();
            trellis.set_brightness(board_config.brightness())?;
            trellis.set_blink_rate(board_config.blink_rate())?;
            info!(
                "  - Board 0x{:02x}: brightness {}, blink rate {}",
                trellis.address(),
                trellis.brightness(),
                trellis.blink_rate()
            );
        }
        for mapping in &self.config.buttons {
            info!("  - Key {}: {:?}", mapping.button, mapping.description);
        }
        Ok(())
    }

    /// Scan once and react to every press and release edge.
    pub fn process_keys(&self) -> Result<()> {
        if !self.keypad.scan_buttons()? {
            return Ok(());
        }

        for key in 0..self.keypad.led_count() {
            if self.keypad.just_pressed(key)? == Some(true) {
                self.on_press(key)?;
            }
            if self.keypad.just_released(key)? == Some(true) {
                self.on_release(key)?;
            }
        }

        self.keypad.show()?;
        Ok(())
    }

    fn on_press(&self, key: usize) -> Result<()> {
        info!("Key {} pressed", key);

        if let Some(mapping) = self.config.command_for(key) {
            CommandExecutor::spawn(mapping.clone());
        }

        match self.config.led_mode {
            LedMode::Momentary => {
                self.keypad.led_on(key)?;
            }
            LedMode::Toggle => {
                let lit = self.keypad.led_state(key)?.unwrap_or(false);
                self.keypad.set_led(key, !lit)?;
            }
        }
        Ok(())
    }

    fn on_release(&self, key: usize) -> Result<()> {
        debug!("Key {} released", key);

        if self.config.led_mode == LedMode::Momentary {
            self.keypad.led_off(key)?;
        }
        Ok(())
    }

    /// A failed scan blanks the keypad, as far as the bus allows, before returning the error.
    pub async fn poll(&mut self) -> Result<()> {
        if let Err(e) = self.process_keys() {
            if let Err(blank) = self.shutdown() {
                warn!("Failed to blank keypad: {:#}", blank);
            }
            return Err(e);
        }

        // Sleep for the configured polling interval
        sleep(Duration::from_millis(self.config.polling.interval_ms)).await;

        Ok(())
    }

    /// Apply a new configuration. The board layout is fixed at startup.
    pub fn reload_config(&mut self, new_config: Config) -> Result<()> {
        new_config.validate()?;

        let addresses = |config: &Config| -> Vec<u8> {
            config.boards.iter().map(|b| b.address).collect()
        };
        if addresses(&new_config) != addresses(&self.config) {
            return Err(anyhow!("Board layout changed, restart required"));
        }

        self.config = new_config;
        self.apply_config()?;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Blank every LED.
    pub fn shutdown(&self) -> Result<()> {
        self.keypad.fill(false);
        self.keypad.show()?;
        Ok(())
    }
}
