use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use trellis_keypad::{DEFAULT_ADDRESS, KEYS_PER_BOARD, MAX_BOARDS};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub i2c: I2cConfig,
    pub polling: PollingConfig,
    /// Board order defines the global key numbering: board k owns keys 16k..16k+16.
    pub boards: Vec<BoardConfig>,
    #[serde(default)]
    pub led_mode: LedMode,
    #[serde(default)]
    pub buttons: Vec<ButtonMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct I2cConfig {
    pub device: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Time between key scans. Also the effective debounce period.
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    pub address: u8,
    pub brightness: Option<u8>,
    pub blink_rate: Option<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedMode {
    /// LED is lit while the key is held.
    #[default]
    Momentary,
    /// Each press flips the LED.
    Toggle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonMapping {
    pub button: usize,
    pub description: Option<String>,
    pub command: String,
}

impl BoardConfig {
    pub fn brightness(&self) -> u8 {
        self.brightness.unwrap_or(15)
    }

    pub fn blink_rate(&self) -> u8 {
        self.blink_rate.unwrap_or(0)
    }
}

impl Config {
    pub fn key_count(&self) -> usize {
        self.boards.len() * KEYS_PER_BOARD
    }

    pub fn command_for(&self, button: usize) -> Option<&ButtonMapping> {
        self.buttons.iter().find(|m| m.button == button)
    }

    pub fn validate(&self) -> Result<()> {
        if self.boards.is_empty() {
            return Err(anyhow!("Configuration error: at least one board is required"));
        }
        if self.boards.len() > MAX_BOARDS {
            return Err(anyhow!(
                "Configuration error: at most {} boards are supported, got {}",
                MAX_BOARDS,
                self.boards.len()
            ));
        }

        let mut seen = HashSet::new();
        for board in &self.boards {
            if !(0x70..=0x77).contains(&board.address) {
                return Err(anyhow!(
                    "Configuration error: board address 0x{:02x} is outside 0x70-0x77",
                    board.address
                ));
            }
            if !seen.insert(board.address) {
                return Err(anyhow!(
                    "Configuration error: board address 0x{:02x} is listed twice",
                    board.address
                ));
            }
            if board.brightness() > 15 {
                return Err(anyhow!(
                    "Configuration error: brightness {} for board 0x{:02x} is outside 0-15",
                    board.brightness(),
                    board.address
                ));
            }
            if board.blink_rate() > 3 {
                return Err(anyhow!(
                    "Configuration error: blink rate {} for board 0x{:02x} is outside 0-3",
                    board.blink_rate(),
                    board.address
                ));
            }
        }

        for mapping in &self.buttons {
            if mapping.button >= self.key_count() {
                return Err(anyhow!(
                    "Configuration error: button {} does not exist on {} board(s)",
                    mapping.button,
                    self.boards.len()
                ));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            i2c: I2cConfig {
                device: "/dev/i2c-1".to_string(),
            },
            polling: PollingConfig { interval_ms: 30 },
            boards: vec![BoardConfig {
                address: DEFAULT_ADDRESS,
                brightness: None,
                blink_rate: None,
            }],
            led_mode: LedMode::default(),
            buttons: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
i2c:
  device: /dev/i2c-2
polling:
  interval_ms: 50
boards:
  - address: 112
  - address: 114
    brightness: 4
    blink_rate: 1
led_mode: toggle
buttons:
  - button: 17
    description: "Backup"
    command: "echo backup"
"#;

    #[test]
    fn test_parse() {
        let config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(config.i2c.device, "/dev/i2c-2");
        assert_eq!(config.polling.interval_ms, 50);
        assert_eq!(config.boards.len(), 2);
        assert_eq!(config.boards[0].address, 0x70);
        assert_eq!(config.boards[0].brightness(), 15);
        assert_eq!(config.boards[1].brightness(), 4);
        assert_eq!(config.boards[1].blink_rate(), 1);
        assert_eq!(config.led_mode, LedMode::Toggle);
        assert_eq!(config.command_for(17).unwrap().command, "echo backup");
        assert!(config.command_for(0).is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert_eq!(config.led_mode, LedMode::Momentary);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_boards() {
        let mut config = Config::default();
        config.boards.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.boards.push(config.boards[0].clone());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.boards[0].address = 0x20;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.boards[0].blink_rate = Some(4);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_button() {
        let mut config = Config::default();
        config.buttons.push(ButtonMapping {
            button: 16,
            description: None,
            command: "true".to_string(),
        });
        assert!(config.validate().is_err());
    }
}
