use std::{collections::BTreeMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;

use crate::{
    GameKey, ServerState, ServerStatus,
    descriptor::GameDescriptor,
    error::LifecycleError,
    inspector::SystemInspector,
    launcher::{ProcessHandle, ProcessLauncher},
    probe,
    progress::{LifecycleEvent, ProgressSink, stepped_wait},
    registry::Registry,
    shutdown::{self, ShutdownOutcome},
    tailer::{self, TailEnd},
};

/// A configured game plus the handle of the process we last launched for it.
#[derive(Debug)]
pub struct GameServer {
    descriptor: Arc<GameDescriptor>,
    handle: Mutex<Option<ProcessHandle>>,
}

impl GameServer {
    pub fn new(descriptor: Arc<GameDescriptor>) -> Self {
        Self {
            descriptor,
            handle: Mutex::new(None),
        }
    }

    pub fn descriptor(&self) -> &GameDescriptor {
        &self.descriptor
    }

    pub async fn is_running(&self, inspector: &dyn SystemInspector) -> bool {
        let mut handle = self.handle.lock().await;
        probe::is_running(&self.descriptor, handle.as_mut(), inspector).await
    }

    pub(crate) async fn track(&self, handle: ProcessHandle) {
        *self.handle.lock().await = Some(handle);
    }

    pub(crate) async fn untrack(&self) -> Option<ProcessHandle> {
        self.handle.lock().await.take()
    }

    pub(crate) async fn terminate_tracked(&self) {
        if let Some(handle) = self.handle.lock().await.as_mut() {
            handle.terminate();
        }
    }

    #[cfg(test)]
    pub(crate) async fn is_tracking(&self) -> bool {
        self.handle.lock().await.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// Launched, but nothing looked alive once the startup budget elapsed.
    NotDetected,
    AlreadyRunning,
    /// Refused: these other servers are running.
    Blocked { running: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    Stopped(ShutdownOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    NotRunning,
    Restarted { shutdown: ShutdownOutcome },
    NotDetected { shutdown: ShutdownOutcome },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Refused: the server must be stopped first.
    ServerRunning,
    Finished(TailEnd),
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub tail_poll_interval: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            tail_poll_interval: tailer::DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Entry point for lifecycle commands.
pub struct Controller {
    registry: Registry,
    servers: BTreeMap<GameKey, Arc<GameServer>>,
    inspector: Arc<dyn SystemInspector>,
    launcher: Arc<dyn ProcessLauncher>,
    options: ControllerOptions,
    // Held from the running-servers check until the startup window closes,
    // so two starts cannot both pass the check.
    launch_gate: Mutex<()>,
}

impl Controller {
    pub fn new(
        registry: Registry,
        inspector: Arc<dyn SystemInspector>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let servers = registry
            .iter()
            .map(|d| (d.key.clone(), Arc::new(GameServer::new(d.clone()))))
            .collect();
        Self {
            registry,
            servers,
            inspector,
            launcher,
            options: ControllerOptions::default(),
            launch_gate: Mutex::new(()),
        }
    }

    pub fn with_options(mut self, options: ControllerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn server(&self, key: &str) -> Result<&Arc<GameServer>, LifecycleError> {
        self.servers
            .get(&GameKey::new(key))
            .ok_or_else(|| LifecycleError::UnknownGame(key.to_string()))
    }

    pub async fn status(&self) -> Vec<ServerStatus> {
        let mut out = Vec::with_capacity(self.servers.len());
        for server in self.servers.values() {
            let d = server.descriptor();
            let state = if server.is_running(&*self.inspector).await {
                ServerState::Running
            } else {
                ServerState::Stopped
            };
            out.push(ServerStatus {
                key: d.key.clone(),
                display_name: d.display_name.clone(),
                state,
            });
        }
        out
    }

    /// Starts a server unless it, or any other server, is already running.
    pub async fn start(
        &self,
        key: &str,
        sink: &dyn ProgressSink,
    ) -> Result<StartOutcome, LifecycleError> {
        let server = self.server(key)?;
        let d = server.descriptor();
        let _gate = self.launch_gate.lock().await;

        let mut running = Vec::new();
        let mut already_running = false;
        for other in self.servers.values() {
            if !other.is_running(&*self.inspector).await {
                continue;
            }
            if Arc::ptr_eq(other, server) {
                already_running = true;
            } else {
                running.push(other.descriptor().display_name.clone());
            }
        }

        if !running.is_empty() {
            tracing::info!(game = %d.key, ?running, "start refused: other servers running");
            return Ok(StartOutcome::Blocked { running });
        }
        if already_running {
            return Ok(StartOutcome::AlreadyRunning);
        }

        sink.emit(LifecycleEvent::Starting).await;
        let up = self.launch_and_watch(server, sink).await?;
        Ok(if up {
            StartOutcome::Started
        } else {
            StartOutcome::NotDetected
        })
    }

    pub async fn stop(
        &self,
        key: &str,
        sink: &dyn ProgressSink,
    ) -> Result<StopOutcome, LifecycleError> {
        let server = self.server(key)?;
        if !server.is_running(&*self.inspector).await {
            return Ok(StopOutcome::NotRunning);
        }

        sink.emit(LifecycleEvent::ShuttingDown).await;
        let outcome = shutdown::shutdown(server, &*self.inspector, sink).await?;
        Ok(StopOutcome::Stopped(outcome))
    }

    /// Shutdown followed by the start sequence. A forced kill does not abort
    /// the restart; a missing window does.
    pub async fn restart(
        &self,
        key: &str,
        sink: &dyn ProgressSink,
    ) -> Result<RestartOutcome, LifecycleError> {
        let server = self.server(key)?;
        if !server.is_running(&*self.inspector).await {
            return Ok(RestartOutcome::NotRunning);
        }

        sink.emit(LifecycleEvent::ShuttingDown).await;
        let shutdown = shutdown::shutdown(server, &*self.inspector, sink).await?;

        sink.emit(LifecycleEvent::Relaunching).await;
        let _gate = self.launch_gate.lock().await;
        let up = self.launch_and_watch(server, sink).await?;
        Ok(if up {
            RestartOutcome::Restarted { shutdown }
        } else {
            RestartOutcome::NotDetected { shutdown }
        })
    }

    /// Runs the update command with its output captured to the update log and
    /// follows that log until the update completes or the tool exits.
    pub async fn update(
        &self,
        key: &str,
        sink: &dyn ProgressSink,
    ) -> Result<UpdateOutcome, LifecycleError> {
        let server = self.server(key)?;
        let d = server.descriptor();
        let not_configured = |what| LifecycleError::NotConfigured {
            game: d.display_name.clone(),
            what,
        };
        let command = d
            .update_command
            .as_deref()
            .ok_or_else(|| not_configured("update command"))?;
        let log = d
            .update_log
            .as_deref()
            .ok_or_else(|| not_configured("update log"))?;

        if server.is_running(&*self.inspector).await {
            return Ok(UpdateOutcome::ServerRunning);
        }

        let mut handle = self.launcher.launch(command, Some(log)).await?;
        let end = tailer::tail_file(log, &mut handle, self.options.tail_poll_interval, sink)
            .await
            .inspect_err(|e| {
                tracing::error!(game = %d.key, error = %e, "error while updating");
            })?;
        tracing::info!(game = %d.key, ?end, "update finished");
        Ok(UpdateOutcome::Finished(end))
    }

    async fn launch_and_watch(
        &self,
        server: &GameServer,
        sink: &dyn ProgressSink,
    ) -> Result<bool, LifecycleError> {
        let d = server.descriptor();
        let handle = self.launcher.launch(&d.start_command, None).await?;
        server.track(handle).await;

        stepped_wait(d.startup_time, sink, |step, of| LifecycleEvent::StartupStep {
            step,
            of,
        })
        .await;

        let up = server.is_running(&*self.inspector).await;
        tracing::info!(game = %d.key, up, "startup window elapsed");
        Ok(up)
    }
}
