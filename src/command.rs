use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::process::Command;

use crate::config::ButtonMapping;

pub struct CommandExecutor;

impl CommandExecutor {
    /// Run the shell command mapped to a key and wait for it to finish.
    pub fn execute(mapping: &ButtonMapping) -> Result<()> {
        info!(
            "Key {} ({}): running `{}`",
            mapping.button,
            mapping.description.as_deref().unwrap_or("no description"),
            mapping.command
        );

        let output = Command::new("sh")
            .arg("-c")
            .arg(&mapping.command)
            .output()
            .context(format!("Failed to execute command: {}", mapping.command))?;

        if output.status.success() {
            if !output.stdout.is_empty() {
                debug!("Command output: {}", String::from_utf8_lossy(&output.stdout));
            }
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                "Command for key {} failed with status: {:?}. Error: {}",
                mapping.button, output.status, stderr
            );
            Err(anyhow::anyhow!(
                "Command failed with status: {:?}",
                output.status
            ))
        }
    }

    /// Run the command on tokio's blocking pool so key scanning carries on meanwhile.
    pub fn spawn(mapping: ButtonMapping) {
        tokio::task::spawn_blocking(move || {
            if let Err(e) = Self::execute(&mapping) {
                warn!("Key {}: {:#}", mapping.button, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(command: &str) -> ButtonMapping {
        ButtonMapping {
            button: 0,
            description: None,
            command: command.to_string(),
        }
    }

    #[test]
    fn test_execute_success() {
        assert!(CommandExecutor::execute(&mapping("echo 'test'")).is_ok());
    }

    #[test]
    fn test_execute_failure() {
        assert!(CommandExecutor::execute(&mapping("false")).is_err());
    }
}
