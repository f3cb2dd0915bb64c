//! Environment configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use stream_protocol::{DEFAULT_LIVENESS_WINDOW, DEFAULT_PING_INTERVAL};

pub const LOG_ENV: &str = "CAMPAIGN_STREAM_LOG";
pub const LIVENESS_ENV: &str = "CAMPAIGN_STREAM_LIVENESS_SECS";
pub const MALFORMED_LIMIT_ENV: &str = "CAMPAIGN_STREAM_MALFORMED_LIMIT";
pub const HISTORY_PATH_ENV: &str = "CAMPAIGN_STREAM_HISTORY_PATH";

pub const DEFAULT_LOG_FILTER: &str = "info";
pub const DEFAULT_MALFORMED_LIMIT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub log_filter: String,
    pub liveness_window: Duration,
    pub malformed_limit: usize,
    pub history_path: Option<PathBuf>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            liveness_window: DEFAULT_LIVENESS_WINDOW,
            malformed_limit: DEFAULT_MALFORMED_LIMIT,
            history_path: None,
        }
    }
}

impl EnvConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let liveness_window = env_u64(LIVENESS_ENV)
            .map(Duration::from_secs)
            .map(|window| window.max(DEFAULT_PING_INTERVAL * 2))
            .unwrap_or(defaults.liveness_window);
        let malformed_limit = env_u64(MALFORMED_LIMIT_ENV)
            .and_then(|limit| usize::try_from(limit).ok())
            .map(|limit| limit.max(1))
            .unwrap_or(defaults.malformed_limit);

        Self {
            log_filter: env_string_opt(LOG_ENV).unwrap_or(defaults.log_filter),
            liveness_window,
            malformed_limit,
            history_path: env_string_opt(HISTORY_PATH_ENV).map(PathBuf::from),
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env_string_opt(key).and_then(|value| value.trim().parse::<u64>().ok())
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    #[test]
    fn unset_env_uses_defaults() {
        let _lock = env_lock();
        let _g1 = set_env_guard(LOG_ENV, None);
        let _g2 = set_env_guard(LIVENESS_ENV, None);
        let _g3 = set_env_guard(MALFORMED_LIMIT_ENV, None);
        let _g4 = set_env_guard(HISTORY_PATH_ENV, None);

        assert_eq!(EnvConfig::from_env(), EnvConfig::default());
        assert_eq!(EnvConfig::default().liveness_window, Duration::from_secs(30));
    }

    #[test]
    fn values_are_read_and_clamped() {
        let _lock = env_lock();
        let _g1 = set_env_guard(LOG_ENV, Some("campaign_stream=debug"));
        let _g2 = set_env_guard(LIVENESS_ENV, Some("5"));
        let _g3 = set_env_guard(MALFORMED_LIMIT_ENV, Some("0"));
        let _g4 = set_env_guard(HISTORY_PATH_ENV, Some("/tmp/history.json"));

        let config = EnvConfig::from_env();
        assert_eq!(config.log_filter, "campaign_stream=debug");
        assert_eq!(config.liveness_window, DEFAULT_PING_INTERVAL * 2);
        assert_eq!(config.malformed_limit, 1);
        assert_eq!(config.history_path, Some(PathBuf::from("/tmp/history.json")));
    }

    #[test]
    fn empty_and_garbage_values_are_ignored() {
        let _lock = env_lock();
        let _g1 = set_env_guard(LOG_ENV, Some("  "));
        let _g2 = set_env_guard(LIVENESS_ENV, Some("soon"));
        let _g3 = set_env_guard(MALFORMED_LIMIT_ENV, Some(""));
        let _g4 = set_env_guard(HISTORY_PATH_ENV, Some(""));

        assert_eq!(EnvConfig::from_env(), EnvConfig::default());
    }
}
