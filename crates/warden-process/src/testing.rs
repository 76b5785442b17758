//! Scripted stand-ins for the OS used by the unit tests.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;

use crate::{
    error::LaunchError,
    inspector::{ProcessInfo, SystemInspector, WindowRef, name_matches, title_contains},
    launcher::{ChildProcess, ProcessHandle, ProcessLauncher},
    progress::{LifecycleEvent, ProgressSink},
};

#[derive(Debug)]
struct FakeWindow {
    window: WindowRef,
    // Process that exits when the window is asked to close.
    closes_pid: Option<u32>,
}

#[derive(Debug, Default)]
struct FakeState {
    processes: Vec<ProcessInfo>,
    windows: Vec<FakeWindow>,
    closed: Vec<String>,
    killed: Vec<u32>,
}

#[derive(Debug, Default)]
pub struct FakeInspector {
    state: Mutex<FakeState>,
}

impl FakeInspector {
    pub fn add_process(&self, pid: u32, name: &str, cmdline: &[&str]) {
        self.state.lock().unwrap().processes.push(ProcessInfo {
            pid,
            name: name.to_string(),
            cmdline: cmdline.iter().map(|s| s.to_string()).collect(),
        });
    }

    pub fn add_window(&self, id: &str, title: &str, closes_pid: Option<u32>) {
        self.state.lock().unwrap().windows.push(FakeWindow {
            window: WindowRef {
                id: id.to_string(),
                title: title.to_string(),
            },
            closes_pid,
        });
    }

    pub fn closed(&self) -> Vec<String> {
        self.state.lock().unwrap().closed.clone()
    }

    pub fn killed(&self) -> Vec<u32> {
        self.state.lock().unwrap().killed.clone()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.state
            .lock()
            .unwrap()
            .processes
            .iter()
            .map(|p| p.pid)
            .collect()
    }
}

#[async_trait]
impl SystemInspector for FakeInspector {
    async fn list_processes(&self) -> Vec<ProcessInfo> {
        self.state.lock().unwrap().processes.clone()
    }

    async fn find_window(&self, title_substring: &str) -> Option<WindowRef> {
        self.state
            .lock()
            .unwrap()
            .windows
            .iter()
            .find(|w| title_contains(&w.window.title, title_substring))
            .map(|w| w.window.clone())
    }

    async fn request_close(&self, window: &WindowRef) -> std::io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.closed.push(window.id.clone());
        let pos = state.windows.iter().position(|w| w.window.id == window.id);
        if let Some(pos) = pos
            && let Some(pid) = state.windows[pos].closes_pid
        {
            state.windows.remove(pos);
            state.processes.retain(|p| p.pid != pid);
        }
        Ok(())
    }

    async fn kill_by_name(&self, name: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(pos) = state.processes.iter().position(|p| name_matches(p, name)) else {
            return false;
        };
        let p = state.processes.remove(pos);
        state.killed.push(p.pid);
        true
    }
}

/// Child whose exit is flipped by the test.
#[derive(Debug)]
pub struct ScriptedChild {
    exited: Arc<AtomicBool>,
}

impl ScriptedChild {
    /// A running child plus the switch that makes it exit.
    pub fn running() -> (Self, Arc<AtomicBool>) {
        let exited = Arc::new(AtomicBool::new(false));
        (
            Self {
                exited: exited.clone(),
            },
            exited,
        )
    }

    pub fn exited() -> Self {
        Self {
            exited: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl ChildProcess for ScriptedChild {
    fn try_exited(&mut self) -> std::io::Result<bool> {
        Ok(self.exited.load(Ordering::SeqCst))
    }

    fn start_kill(&mut self) -> std::io::Result<()> {
        self.exited.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// What a [`FakeLauncher`] does when asked to launch.
#[derive(Debug, Clone)]
pub enum LaunchScript {
    /// Adds a process with the given pid, name and command line to the
    /// inspector, plus a window that closes it when `window_title` is set.
    Spawn {
        pid: u32,
        name: String,
        cmdline: Vec<String>,
        window_title: Option<String>,
    },
    /// Launch succeeds but nothing shows up in the process table.
    Nothing,
    Fail,
}

#[derive(Debug)]
pub struct FakeLauncher {
    inspector: Arc<FakeInspector>,
    script: Mutex<LaunchScript>,
    launches: Mutex<Vec<(String, Option<PathBuf>)>>,
}

impl FakeLauncher {
    pub fn new(inspector: Arc<FakeInspector>, script: LaunchScript) -> Self {
        Self {
            inspector,
            script: Mutex::new(script),
            launches: Mutex::new(Vec::new()),
        }
    }

    pub fn launches(&self) -> Vec<(String, Option<PathBuf>)> {
        self.launches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessLauncher for FakeLauncher {
    async fn launch(
        &self,
        command: &str,
        log_file: Option<&Path>,
    ) -> Result<ProcessHandle, LaunchError> {
        let script = self.script.lock().unwrap().clone();
        if let LaunchScript::Fail = script {
            return Err(LaunchError::Spawn {
                command: command.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            });
        }

        self.launches
            .lock()
            .unwrap()
            .push((command.to_string(), log_file.map(Path::to_path_buf)));

        if let Some(path) = log_file {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir).unwrap();
            }
            std::fs::File::create(path).unwrap();
        }

        if let LaunchScript::Spawn {
            pid,
            name,
            cmdline,
            window_title,
        } = script
        {
            let args: Vec<&str> = cmdline.iter().map(String::as_str).collect();
            self.inspector.add_process(pid, &name, &args);
            if let Some(title) = window_title {
                self.inspector
                    .add_window(&format!("win-{pid}"), &title, Some(pid));
            }
        }

        // The launch wrapper exits right away; the game lives on its own.
        Ok(ProcessHandle::new(Some(1), ScriptedChild::exited()))
    }
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn emit(&self, event: LifecycleEvent) {
        self.events.lock().unwrap().push(event);
    }
}
