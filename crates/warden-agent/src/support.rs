use std::{path::PathBuf, time::Duration};

const DEFAULT_TAIL_POLL_MS: u64 = 1000;
const DEFAULT_EDIT_INTERVAL_MS: u64 = 1000;

pub(crate) fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<u64>().ok())
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn clamp_ms(raw: Option<u64>, min: u64, max: u64, default: u64) -> Duration {
    Duration::from_millis(raw.map(|v| v.clamp(min, max)).unwrap_or(default))
}

pub(crate) fn tail_poll_interval() -> Duration {
    clamp_ms(env_u64("WARDEN_TAIL_POLL_MS"), 50, 10_000, DEFAULT_TAIL_POLL_MS)
}

pub(crate) fn edit_interval() -> Duration {
    clamp_ms(env_u64("WARDEN_EDIT_INTERVAL_MS"), 0, 10_000, DEFAULT_EDIT_INTERVAL_MS)
}

pub(crate) fn log_dir() -> PathBuf {
    env_path("WARDEN_LOG_DIR").unwrap_or_else(|| PathBuf::from("logs"))
}

pub(crate) fn config_path() -> PathBuf {
    env_path("WARDEN_CONFIG").unwrap_or_else(|| PathBuf::from("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_ms_applies_bounds_and_default() {
        assert_eq!(clamp_ms(None, 50, 10_000, 1000), Duration::from_millis(1000));
        assert_eq!(clamp_ms(Some(5), 50, 10_000, 1000), Duration::from_millis(50));
        assert_eq!(
            clamp_ms(Some(60_000), 50, 10_000, 1000),
            Duration::from_millis(10_000)
        );
        assert_eq!(clamp_ms(Some(0), 0, 10_000, 1000), Duration::ZERO);
    }
}
