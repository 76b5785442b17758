use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

use crate::{GameKey, error::ConfigError};

pub const DEFAULT_STARTUP_SECS: f64 = 30.0;
pub const DEFAULT_SHUTDOWN_SECS: f64 = 10.0;

/// One `games.<key>` entry as written in the config file.
///
/// Every field is optional here so a broken entry can be reported and skipped
/// by [`crate::Registry::build`] instead of failing the whole file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GameConfig {
    pub display_name: Option<String>,
    pub start_command: Option<String>,
    pub stop_command: Option<String>,
    pub update_command: Option<String>,
    pub process_name: Option<String>,
    pub update_log: Option<PathBuf>,
    pub startup_time: Option<f64>,
    pub shutdown_time: Option<f64>,
}

/// Validated, immutable description of one managed game server.
#[derive(Debug, Clone, PartialEq)]
pub struct GameDescriptor {
    pub key: GameKey,
    pub display_name: String,
    pub start_command: String,
    // Kept on the descriptor but never invoked: stop goes through window
    // close and kill-by-name.
    pub stop_command: String,
    pub update_command: Option<String>,
    pub update_log: Option<PathBuf>,
    pub process_name: String,
    pub startup_time: Duration,
    pub shutdown_time: Duration,
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn budget(
    game: &str,
    field: &'static str,
    value: Option<f64>,
    default_secs: f64,
) -> Result<Duration, ConfigError> {
    let secs = value.unwrap_or(default_secs);
    let invalid = || ConfigError::InvalidDuration {
        game: game.to_string(),
        field,
        value: secs,
    };
    // Rejects NaN, infinities, negatives and values too large for a Duration.
    let budget = Duration::try_from_secs_f64(secs).map_err(|_| invalid())?;
    if budget.is_zero() {
        return Err(invalid());
    }
    Ok(budget)
}

impl GameDescriptor {
    pub fn from_config(key: &str, cfg: GameConfig) -> Result<Self, ConfigError> {
        let display_name = required(cfg.display_name);
        let start_command = required(cfg.start_command);
        let stop_command = required(cfg.stop_command);
        let process_name = required(cfg.process_name);

        let mut missing = Vec::new();
        if display_name.is_none() {
            missing.push("display_name");
        }
        if start_command.is_none() {
            missing.push("start_command");
        }
        if stop_command.is_none() {
            missing.push("stop_command");
        }
        if process_name.is_none() {
            missing.push("process_name");
        }

        let (Some(display_name), Some(start_command), Some(stop_command), Some(process_name)) =
            (display_name, start_command, stop_command, process_name)
        else {
            return Err(ConfigError::MissingFields {
                game: key.to_string(),
                missing,
            });
        };

        let startup_time = budget(key, "startup_time", cfg.startup_time, DEFAULT_STARTUP_SECS)?;
        let shutdown_time =
            budget(key, "shutdown_time", cfg.shutdown_time, DEFAULT_SHUTDOWN_SECS)?;

        Ok(Self {
            key: GameKey::new(key),
            display_name,
            start_command,
            stop_command,
            update_command: optional(cfg.update_command),
            update_log: cfg.update_log.filter(|p| !p.as_os_str().is_empty()),
            process_name,
            startup_time,
            shutdown_time,
        })
    }
}

#[cfg(test)]
pub(crate) fn sample_config(name: &str) -> GameConfig {
    GameConfig {
        display_name: Some(name.to_string()),
        start_command: Some(format!("/srv/{name}/start.sh")),
        stop_command: Some(format!("/srv/{name}/stop.sh")),
        update_command: None,
        process_name: Some(format!("{name}_server")),
        update_log: None,
        startup_time: None,
        shutdown_time: None,
    }
}
