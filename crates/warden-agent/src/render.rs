//! Chat text for progress events and command results.

use warden_process::{
    LifecycleError, LifecycleEvent, RestartOutcome, ShutdownOutcome, StartOutcome, StopOutcome,
    TailEnd, UpdateOutcome, UpdatePhase,
    progress::{bar, filled_units, step_percent},
};

use crate::commands::Action;

const EMPTY: &str = "⬜";
const START_FILL: &str = "🟩";
const STOP_FILL: &str = "🟥";

/// How one progress event should reach the chat.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Replaces the text of the command's progress message. A change of
    /// `stage`, or `last`, bypasses edit throttling.
    Progress {
        text: String,
        stage: &'static str,
        last: bool,
    },
    /// Sent as a separate message.
    Notice(String),
    Nothing,
}

fn update_fill(phase: UpdatePhase) -> Option<&'static str> {
    match phase {
        UpdatePhase::Downloading => Some("🟦"),
        UpdatePhase::VerifyingInstall => Some("🟩"),
        UpdatePhase::VerifyingUpdate => Some("🟧"),
        UpdatePhase::Preallocating => Some("🟨"),
        UpdatePhase::Committing => Some("🟥"),
        _ => None,
    }
}

fn stepped(title: String, step: usize, of: usize, fill: &str) -> String {
    let percent = step_percent(step, of);
    format!(
        "{title}\nProgress: {percent}%\n[{}]",
        bar(filled_units(percent as f64), fill, EMPTY)
    )
}

pub fn progress(action: Action, name: &str, event: &LifecycleEvent) -> Output {
    match *event {
        LifecycleEvent::Starting => Output::Progress {
            text: format!("Starting {name} server..."),
            stage: "starting",
            last: false,
        },
        LifecycleEvent::StartupStep { step, of } => Output::Progress {
            text: stepped(format!("Starting {name} server..."), step, of, START_FILL),
            stage: "starting",
            last: step >= of,
        },
        LifecycleEvent::ShuttingDown => {
            let text = match action {
                Action::Restart => format!("Restarting {name} server...\nStage: Shutting down..."),
                _ => format!("Stopping {name} server..."),
            };
            Output::Progress {
                text,
                stage: "shutdown",
                last: false,
            }
        }
        LifecycleEvent::ShutdownStep { step, of } => {
            let title = match action {
                Action::Restart => format!("Shutting down {name} server..."),
                _ => format!("Stopping {name} server..."),
            };
            Output::Progress {
                text: stepped(title, step, of, STOP_FILL),
                stage: "shutdown",
                last: step >= of,
            }
        }
        LifecycleEvent::ShutdownTimedOut { budget } => Output::Notice(format!(
            "⚠️ {name} server did not shut down gracefully in {} seconds. Forcing shutdown...",
            budget.as_secs_f64()
        )),
        LifecycleEvent::ForceKilled { matched: true } => {
            Output::Notice(format!("⚠️ {name} server was forcefully shut down."))
        }
        LifecycleEvent::ForceKilled { matched: false } => Output::Notice(format!(
            "⚠️ No process named like {name} server was found to kill."
        )),
        LifecycleEvent::Relaunching => Output::Progress {
            text: format!("Restarting {name} server...\nStage: Starting up..."),
            stage: "relaunch",
            last: false,
        },
        LifecycleEvent::UpdatePhase { phase, percent } => update_progress(name, phase, percent),
    }
}

fn update_progress(name: &str, phase: UpdatePhase, percent: Option<f64>) -> Output {
    let stage = phase.label();
    let text = match (phase, update_fill(phase), percent) {
        (UpdatePhase::Initializing, ..) => {
            format!("Updating {name} server...\nStage: Initializing...")
        }
        (_, Some(fill), Some(percent)) => format!(
            "{stage} {name} server...\nProgress: {percent:.2}%\n[{}]",
            bar(filled_units(percent), fill, EMPTY)
        ),
        _ if phase.is_terminal() => return Output::Nothing,
        _ => format!("{stage} {name} server..."),
    };
    Output::Progress {
        text,
        stage,
        last: false,
    }
}

pub fn lifecycle_error(action: Action, name: &str, err: &LifecycleError) -> String {
    match err {
        LifecycleError::UnknownGame(key) => format!("❌ Game '{key}' not found."),
        LifecycleError::NotConfigured { what, .. } => {
            format!("❌ {name} server cannot {}: {what} not configured.", action.verb())
        }
        LifecycleError::Launch(e) => format!(
            "❌ Failed to {} {name} server.\nError: {e}\nPlease check the logs for details.",
            action.verb()
        ),
        LifecycleError::WindowNotFound { .. } => format!(
            "❌ Could not find window for {name}. Please ensure the process is running and has a visible window."
        ),
        LifecycleError::Tail(e) => format!("❌ Error while updating {name} server: {e}"),
    }
}

pub fn start_result(name: &str, outcome: &StartOutcome) -> String {
    match outcome {
        StartOutcome::Started => format!("✅ {name} server started successfully!"),
        StartOutcome::NotDetected => format!(
            "❌ Failed to start {name} server.\nIt was not detected after the startup window. Please check the logs for details."
        ),
        StartOutcome::AlreadyRunning => format!("✅ {name} server is already running."),
        StartOutcome::Blocked { running } => format!(
            "❌ Cannot start {name} server because the following server(s) are already running: {}. Please stop them before starting a new server.",
            running.join(", ")
        ),
    }
}

pub fn stop_result(name: &str, outcome: &StopOutcome) -> String {
    match outcome {
        StopOutcome::NotRunning => format!("❌ {name} server is not running."),
        StopOutcome::Stopped(ShutdownOutcome::Graceful) => {
            format!("✅ {name} server shut down successfully!")
        }
        StopOutcome::Stopped(ShutdownOutcome::Forced { .. }) => {
            format!("⚠️ {name} server was stopped forcefully.")
        }
    }
}

pub fn restart_result(name: &str, outcome: &RestartOutcome) -> String {
    match outcome {
        RestartOutcome::NotRunning => {
            format!("❌ {name} server is not running, so it cannot be restarted.")
        }
        RestartOutcome::Restarted { .. } => format!("✅ {name} server restarted successfully!"),
        RestartOutcome::NotDetected { .. } => {
            format!("❌ Failed to start {name} server after shutdown.")
        }
    }
}

pub fn update_result(name: &str, outcome: &UpdateOutcome) -> String {
    match outcome {
        UpdateOutcome::ServerRunning => format!(
            "❌ Cannot update {name} server because it is currently running. Please stop the server before updating."
        ),
        UpdateOutcome::Finished(TailEnd::Completed {
            already_up_to_date: true,
        }) => format!("✅ {name} server is already up to date!"),
        UpdateOutcome::Finished(TailEnd::Completed { .. }) => {
            format!("✅ {name} server updated successfully!")
        }
        UpdateOutcome::Finished(TailEnd::ProcessExitedQuietly) => {
            format!("✅ {name} server update process completed.")
        }
    }
}

pub fn usage(prefix: &str, action: Action) -> String {
    format!("❌ Usage: `{prefix}{} <game>`", action.verb())
}

pub fn help(prefix: &str, games: &[&str]) -> String {
    let games = if games.is_empty() {
        "(none configured)".to_string()
    } else {
        games.join(", ")
    };
    format!(
        "**Commands**\n\
         `{prefix}start <game>` start a server\n\
         `{prefix}stop <game>` stop a running server\n\
         `{prefix}restart <game>` stop then start a server\n\
         `{prefix}update <game>` update a stopped server\n\
         `{prefix}status` show servers and host usage\n\
         **Games**: {games}"
    )
}

/// Name/value pairs of the status embed, in display order.
pub fn status_fields(
    games: &[(String, bool)],
    host: &crate::server_info::HostInfo,
    password: &str,
) -> Vec<(String, String, bool)> {
    const BLANK: &str = "\u{200b}";
    let mut fields: Vec<(String, String, bool)> = games
        .iter()
        .map(|(name, running)| {
            let dot = if *running { ":green_circle:" } else { ":red_circle:" };
            (format!("{dot} {name}"), BLANK.to_string(), false)
        })
        .collect();
    fields.extend([
        ("🌐 External IP".to_string(), host.external_ip.clone(), true),
        ("🔐 Password".to_string(), password.to_string(), true),
        (BLANK.to_string(), BLANK.to_string(), true),
        ("🧠 CPU Usage".to_string(), format!("{:.1}%", host.cpu_percent), true),
        ("💾 Memory Usage".to_string(), host.memory.clone(), true),
        (BLANK.to_string(), BLANK.to_string(), true),
    ]);
    fields
}
