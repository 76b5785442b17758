pub mod controller;
pub mod descriptor;
pub mod error;
pub mod inspector;
pub mod launcher;
pub mod os;
pub mod probe;
pub mod progress;
pub mod registry;
pub mod shutdown;
pub mod tailer;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{
    Controller, ControllerOptions, GameServer, RestartOutcome, StartOutcome, StopOutcome,
    UpdateOutcome,
};
pub use descriptor::{GameConfig, GameDescriptor};
pub use error::{ConfigError, LaunchError, LifecycleError, TailError};
pub use inspector::{ProcessInfo, SystemInspector, WindowRef};
pub use launcher::{ProcessHandle, ProcessLauncher, ShellLauncher};
pub use os::OsInspector;
pub use progress::{LifecycleEvent, ProgressSink};
pub use registry::Registry;
pub use shutdown::ShutdownOutcome;
pub use tailer::{TailEnd, UpdatePhase};

/// Stable, lowercase game identifier used for lookups.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GameKey(pub String);

impl GameKey {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GameKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Running,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub key: GameKey,
    pub display_name: String,
    pub state: ServerState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_key_is_trimmed_and_lowercased() {
        let key = GameKey::new("  Valheim ");
        assert_eq!(key.as_str(), "valheim");
        assert_eq!(key.to_string(), "valheim");
    }
}
