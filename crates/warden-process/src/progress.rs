use std::time::Duration;

use async_trait::async_trait;

use crate::tailer::UpdatePhase;

/// Number of progress units in a bar, and of wait steps in startup/shutdown.
pub const PROGRESS_STEPS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Starting,
    /// `step` is 1-based.
    StartupStep { step: usize, of: usize },
    ShuttingDown,
    ShutdownStep { step: usize, of: usize },
    /// The graceful wait elapsed and the server still reports running.
    ShutdownTimedOut { budget: Duration },
    ForceKilled { matched: bool },
    /// Restart finished its shutdown half and is launching again.
    Relaunching,
    UpdatePhase {
        phase: UpdatePhase,
        percent: Option<f64>,
    },
}

/// Receiver for progress events of one command.
///
/// Delivery is best-effort: a sink that cannot reach its caller anymore
/// swallows the event and the operation carries on.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn emit(&self, event: LifecycleEvent);
}

pub fn step_percent(step: usize, of: usize) -> u8 {
    if of == 0 {
        return 100;
    }
    ((step.min(of) * 100) / of) as u8
}

/// Filled units of a [`PROGRESS_STEPS`]-wide bar for a percentage.
pub fn filled_units(percent: f64) -> usize {
    if !percent.is_finite() || percent <= 0.0 {
        return 0;
    }
    ((percent / 10.0).floor() as usize).min(PROGRESS_STEPS)
}

pub fn bar(filled: usize, fill: &str, empty: &str) -> String {
    let filled = filled.min(PROGRESS_STEPS);
    format!(
        "{}{}",
        fill.repeat(filled),
        empty.repeat(PROGRESS_STEPS - filled)
    )
}

/// Sleeps `budget` in [`PROGRESS_STEPS`] equal slices, reporting each slice
/// before it is slept.
pub(crate) async fn stepped_wait(
    budget: Duration,
    sink: &dyn ProgressSink,
    event: impl Fn(usize, usize) -> LifecycleEvent,
) {
    let per_step = budget / PROGRESS_STEPS as u32;
    for step in 1..=PROGRESS_STEPS {
        sink.emit(event(step, PROGRESS_STEPS)).await;
        tokio::time::sleep(per_step).await;
    }
}
