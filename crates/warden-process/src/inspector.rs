//! Capability over the host's process and window tables.
//!
//! Everything here reads racy OS state. Implementations swallow "process went
//! away" and "permission denied" conditions and return what they could see.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    /// Command line arguments. Empty when the OS would not reveal them.
    pub cmdline: Vec<String>,
}

impl ProcessInfo {
    pub fn joined_cmdline(&self) -> String {
        self.cmdline.join(" ")
    }
}

/// A top-level window that can receive a close request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRef {
    pub id: String,
    pub title: String,
}

#[async_trait]
pub trait SystemInspector: Send + Sync {
    /// Snapshot of live processes. Never fails; entries that vanished or could
    /// not be read are simply missing.
    async fn list_processes(&self) -> Vec<ProcessInfo>;

    /// First visible window whose title contains `title_substring`,
    /// case-insensitively.
    async fn find_window(&self, title_substring: &str) -> Option<WindowRef>;

    /// Posts a close request to the window and returns without waiting for it
    /// to be honoured.
    async fn request_close(&self, window: &WindowRef) -> std::io::Result<()>;

    /// Kills the first process whose name equals `name` case-insensitively.
    /// Returns whether a matching process was found and signalled.
    async fn kill_by_name(&self, name: &str) -> bool;
}

pub fn cmdline_contains(process: &ProcessInfo, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    if needle.is_empty() {
        return false;
    }
    process.joined_cmdline().to_lowercase().contains(&needle)
}

pub fn name_matches(process: &ProcessInfo, name: &str) -> bool {
    process.name.to_lowercase() == name.to_lowercase()
}

pub fn title_contains(title: &str, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    !needle.is_empty() && title.to_lowercase().contains(&needle)
}
