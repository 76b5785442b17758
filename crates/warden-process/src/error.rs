use std::path::PathBuf;

use thiserror::Error;

/// A configured game entry that cannot become a descriptor.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing keys {missing:?} in config for game '{game}'")]
    MissingFields {
        game: String,
        missing: Vec<&'static str>,
    },

    #[error("invalid {field} for game '{game}': {value} (must be a positive number of seconds)")]
    InvalidDuration {
        game: String,
        field: &'static str,
        value: f64,
    },
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("cannot determine working directory for command: {command}")]
    NoWorkingDirectory { command: String },

    #[error("prepare log file {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum TailError {
    #[error("open update log {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("read update log: {0}")]
    Read(#[source] std::io::Error),
}

/// Failure of a single lifecycle command, surfaced to the end user.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("game '{0}' not found")]
    UnknownGame(String),

    #[error("{what} not configured for {game}")]
    NotConfigured { game: String, what: &'static str },

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("could not find window for {display_name}")]
    WindowNotFound { display_name: String },

    #[error(transparent)]
    Tail(#[from] TailError),
}
