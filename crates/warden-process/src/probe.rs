use crate::{
    descriptor::GameDescriptor,
    inspector::{SystemInspector, cmdline_contains},
    launcher::ProcessHandle,
};

/// Whether the game server looks alive.
///
/// A live tracked handle is enough. Otherwise (no handle, or it exited) the OS
/// process table is scanned for a command line containing the descriptor's
/// process name, because launch scripts often exit while the game they spawned
/// keeps running.
pub async fn is_running(
    descriptor: &GameDescriptor,
    handle: Option<&mut ProcessHandle>,
    inspector: &dyn SystemInspector,
) -> bool {
    if let Some(handle) = handle
        && handle.is_alive()
    {
        return true;
    }

    let found = inspector
        .list_processes()
        .await
        .into_iter()
        .find(|p| cmdline_contains(p, &descriptor.process_name));

    match found {
        Some(p) => {
            tracing::debug!(game = %descriptor.key, pid = p.pid, "process table match");
            true
        }
        None => false,
    }
}
