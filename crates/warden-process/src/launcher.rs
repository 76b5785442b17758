use std::{
    fmt,
    path::{Component, Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::LaunchError;

/// The OS-facing half of a [`ProcessHandle`].
pub trait ChildProcess: Send + fmt::Debug {
    /// Non-blocking exit check.
    fn try_exited(&mut self) -> std::io::Result<bool>;

    /// Asks the OS to kill the process without waiting for it.
    fn start_kill(&mut self) -> std::io::Result<()>;
}

impl ChildProcess for tokio::process::Child {
    fn try_exited(&mut self) -> std::io::Result<bool> {
        Ok(self.try_wait()?.is_some())
    }

    fn start_kill(&mut self) -> std::io::Result<()> {
        tokio::process::Child::start_kill(self)
    }
}

/// Handle to a process this controller launched.
///
/// It is one liveness signal among several: launch scripts commonly exit
/// right after spawning the real game binary.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    child: Box<dyn ChildProcess>,
}

impl ProcessHandle {
    pub fn new(pid: Option<u32>, child: impl ChildProcess + 'static) -> Self {
        Self {
            pid,
            child: Box::new(child),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// `true` only when the OS positively reports the process as still running.
    pub fn is_alive(&mut self) -> bool {
        match self.child.try_exited() {
            Ok(exited) => !exited,
            Err(e) => {
                tracing::debug!(pid = ?self.pid, error = %e, "cannot read child state");
                false
            }
        }
    }

    /// Best-effort kill, skipped when the child already exited.
    pub fn terminate(&mut self) {
        if !self.is_alive() {
            return;
        }
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(pid = ?self.pid, error = %e, "kill tracked child failed");
        }
    }
}

#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Starts `command` through the host shell from the command's directory.
    ///
    /// With `log_file`, combined stdout/stderr go to a freshly truncated file.
    /// Without it the child is detached and its stdio discarded. Returns once
    /// the OS accepted the spawn.
    async fn launch(
        &self,
        command: &str,
        log_file: Option<&Path>,
    ) -> Result<ProcessHandle, LaunchError>;
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Directory the command is run from: the parent of the command path.
pub fn working_dir(command: &str) -> Result<PathBuf, LaunchError> {
    let normalized = normalize(Path::new(command.trim()));
    normalized
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .ok_or_else(|| LaunchError::NoWorkingDirectory {
            command: command.to_string(),
        })
}

fn shell_command(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }

    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

async fn open_log(path: &Path) -> Result<(Stdio, Stdio), LaunchError> {
    let wrap = |source: std::io::Error| LaunchError::LogFile {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.map_err(wrap)?;
    }

    let file = tokio::fs::File::create(path).await.map_err(wrap)?.into_std().await;
    let err = file.try_clone().map_err(wrap)?;
    Ok((Stdio::from(file), Stdio::from(err)))
}

/// Launches commands through `sh -c` (or `cmd /C` on Windows).
#[derive(Debug, Clone, Default)]
pub struct ShellLauncher;

#[async_trait]
impl ProcessLauncher for ShellLauncher {
    async fn launch(
        &self,
        command: &str,
        log_file: Option<&Path>,
    ) -> Result<ProcessHandle, LaunchError> {
        let command = normalize(Path::new(command.trim()))
            .to_string_lossy()
            .into_owned();
        let dir = working_dir(&command)?;
        tracing::info!(%command, cwd = %dir.display(), "attempting to run");

        let mut cmd = shell_command(&command);
        cmd.current_dir(&dir).stdin(Stdio::null());

        match log_file {
            Some(path) => {
                let (out, err) = open_log(path).await?;
                cmd.stdout(out).stderr(err);
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());

                // Own session so the game outlives the controller.
                #[cfg(unix)]
                unsafe {
                    cmd.pre_exec(|| {
                        if libc::setsid() == -1 {
                            return Err(std::io::Error::last_os_error());
                        }
                        Ok(())
                    });
                }
            }
        }

        let child = cmd.spawn().map_err(|source| {
            tracing::error!(%command, error = %source, "error running command");
            LaunchError::Spawn {
                command: command.clone(),
                source,
            }
        })?;
        // `cmd` still owns the parent's copies of the log file handles.
        drop(cmd);

        let pid = child.id();
        tracing::info!(%command, pid = ?pid, "started process");
        Ok(ProcessHandle::new(pid, child))
    }
}
