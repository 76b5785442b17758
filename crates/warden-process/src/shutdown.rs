use crate::{
    controller::GameServer,
    error::LifecycleError,
    inspector::{SystemInspector, WindowRef},
    progress::{LifecycleEvent, ProgressSink, stepped_wait},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The server went away within its shutdown budget.
    Graceful,
    /// The budget elapsed and the kill-by-name path ran. `killed` is false when
    /// no process name matched exactly.
    Forced { killed: bool },
}

#[derive(Debug)]
enum ShutdownState {
    LocatingWindow,
    GracefulWait(WindowRef),
    Settled,
    ForceKill,
    Done(ShutdownOutcome),
}

/// Close-request, bounded wait, then kill by name if the server is still up.
///
/// A missing window is a hard failure: nothing is killed on that path.
pub async fn shutdown(
    server: &GameServer,
    inspector: &dyn SystemInspector,
    sink: &dyn ProgressSink,
) -> Result<ShutdownOutcome, LifecycleError> {
    let d = server.descriptor();
    let mut state = ShutdownState::LocatingWindow;

    loop {
        tracing::debug!(game = %d.key, ?state, "shutdown state");
        state = match state {
            ShutdownState::LocatingWindow => {
                let Some(window) = inspector.find_window(&d.process_name).await else {
                    tracing::warn!(game = %d.key, "no window to close");
                    return Err(LifecycleError::WindowNotFound {
                        display_name: d.display_name.clone(),
                    });
                };
                if let Err(e) = inspector.request_close(&window).await {
                    tracing::warn!(game = %d.key, window = %window.id, error = %e, "close request failed");
                }
                ShutdownState::GracefulWait(window)
            }
            ShutdownState::GracefulWait(window) => {
                tracing::info!(game = %d.key, window = %window.title, "waiting for graceful shutdown");
                stepped_wait(d.shutdown_time, sink, |step, of| {
                    LifecycleEvent::ShutdownStep { step, of }
                })
                .await;

                if server.is_running(inspector).await {
                    ShutdownState::ForceKill
                } else {
                    ShutdownState::Settled
                }
            }
            ShutdownState::Settled => ShutdownState::Done(ShutdownOutcome::Graceful),
            ShutdownState::ForceKill => {
                tracing::warn!(
                    game = %d.key,
                    budget_secs = d.shutdown_time.as_secs_f64(),
                    "did not shut down gracefully; forcing"
                );
                sink.emit(LifecycleEvent::ShutdownTimedOut {
                    budget: d.shutdown_time,
                })
                .await;

                let killed = inspector.kill_by_name(&d.process_name).await;
                server.terminate_tracked().await;
                if !killed {
                    tracing::warn!(game = %d.key, name = %d.process_name, "no process with matching name to kill");
                }
                sink.emit(LifecycleEvent::ForceKilled { matched: killed }).await;
                ShutdownState::Done(ShutdownOutcome::Forced { killed })
            }
            ShutdownState::Done(outcome) => {
                server.untrack().await;
                tracing::info!(game = %d.key, ?outcome, "shutdown done");
                return Ok(outcome);
            }
        };
    }
}
