//! [`SystemInspector`] backed by the host OS.
//!
//! Processes come from `sysinfo`. Windows are found and closed through
//! `wmctrl` on X11 desktops and through `tasklist`/`taskkill` on Windows,
//! where a non-forced `taskkill` posts a close to the window.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tokio::process::Command;

use crate::inspector::{ProcessInfo, SystemInspector, WindowRef, title_contains};

#[derive(Debug, Clone)]
pub struct OsInspector {
    system: Arc<Mutex<System>>,
}

impl Default for OsInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl OsInspector {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }

    async fn with_fresh_processes<T, F>(&self, f: F) -> Option<T>
    where
        F: FnOnce(&System) -> T + Send + 'static,
        T: Send + 'static,
    {
        let system = self.system.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let mut system = match system.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            system.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::nothing().with_cmd(UpdateKind::OnlyIfNotSet),
            );
            f(&system)
        })
        .await;

        match joined {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(error = %e, "process table scan failed");
                None
            }
        }
    }

    async fn list_windows(&self) -> Vec<WindowRef> {
        let (program, args) = if cfg!(windows) {
            ("tasklist", vec!["/v", "/fo", "csv", "/nh"])
        } else {
            ("wmctrl", vec!["-l"])
        };

        let output = match Command::new(program).args(args).output().await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(program, error = %e, "window listing unavailable");
                return Vec::new();
            }
        };
        if !output.status.success() {
            tracing::warn!(
                program,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "window listing failed"
            );
            return Vec::new();
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| {
                if cfg!(windows) {
                    parse_tasklist_line(line)
                } else {
                    parse_wmctrl_line(line)
                }
            })
            .collect()
    }
}

#[async_trait]
impl SystemInspector for OsInspector {
    async fn list_processes(&self) -> Vec<ProcessInfo> {
        self.with_fresh_processes(|system| {
            system
                .processes()
                .iter()
                .map(|(pid, p)| ProcessInfo {
                    pid: pid.as_u32(),
                    name: p.name().to_string_lossy().into_owned(),
                    cmdline: p
                        .cmd()
                        .iter()
                        .map(|arg| arg.to_string_lossy().into_owned())
                        .collect(),
                })
                .collect()
        })
        .await
        .unwrap_or_default()
    }

    async fn find_window(&self, title_substring: &str) -> Option<WindowRef> {
        self.list_windows()
            .await
            .into_iter()
            .find(|w| title_contains(&w.title, title_substring))
    }

    async fn request_close(&self, window: &WindowRef) -> std::io::Result<()> {
        let status = if cfg!(windows) {
            Command::new("taskkill")
                .args(["/PID", window.id.as_str()])
                .status()
                .await?
        } else {
            Command::new("wmctrl")
                .args(["-i", "-c", window.id.as_str()])
                .status()
                .await?
        };
        if status.success() {
            Ok(())
        } else {
            Err(std::io::Error::other(format!(
                "close request for window {} exited with {status}",
                window.id
            )))
        }
    }

    async fn kill_by_name(&self, name: &str) -> bool {
        let wanted = name.to_lowercase();
        self.with_fresh_processes(move |system| {
            let target = system
                .processes()
                .iter()
                .filter(|(_, p)| p.name().to_string_lossy().to_lowercase() == wanted)
                .min_by_key(|(pid, _)| pid.as_u32());
            match target {
                Some((pid, p)) => {
                    let sent = p.kill();
                    tracing::info!(pid = pid.as_u32(), sent, "killed by name");
                    sent
                }
                None => false,
            }
        })
        .await
        .unwrap_or(false)
    }
}

/// `wmctrl -l` prints `<id> <desktop> <host> <title...>`.
fn parse_wmctrl_line(line: &str) -> Option<WindowRef> {
    let mut rest = line.trim_start();
    let mut fields = [""; 3];
    for field in &mut fields {
        let (head, tail) = rest.split_once(char::is_whitespace)?;
        *field = head;
        rest = tail.trim_start();
    }
    Some(WindowRef {
        id: fields[0].to_string(),
        title: rest.trim_end().to_string(),
    })
}

/// One row of `tasklist /v /fo csv /nh`. The window id is the owning PID.
fn parse_tasklist_line(line: &str) -> Option<WindowRef> {
    let line = line.trim();
    let inner = line.strip_prefix('"')?.strip_suffix('"')?;
    let fields: Vec<&str> = inner.split("\",\"").collect();
    let pid = fields.get(1)?;
    let title = fields.get(8)?;
    if pid.parse::<u32>().is_err() || title.is_empty() || *title == "N/A" {
        return None;
    }
    Some(WindowRef {
        id: pid.to_string(),
        title: title.to_string(),
    })
}
