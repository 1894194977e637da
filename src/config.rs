//! Daemon configuration from environment variables.
//!
//! Every knob has a default matching a plain laptop deployment; overrides
//! come from the environment (or a `.env` file loaded in `main`). Paths
//! resolve under `~/.aws` so the token store stays compatible with other
//! consumers of the same credential cache.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// State directory name under `~/.aws`
const STATE_DIR_NAME: &str = "sso-sentinel";

/// Signal file name in the state directory
const SIGNAL_FILE: &str = "login-required.json";

/// Lock directory name in the state directory
const LOCK_DIR: &str = "login.lock";

/// Cooldown timestamp file name in the state directory
const COOLDOWN_FILE: &str = "last-login-at.txt";

/// Mode file name in the state directory
const MODE_FILE: &str = "mode";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Profile whose session is watched when a signal names none.
    pub profile: String,
    /// AWS shared config file (profiles and sso-session blocks).
    pub aws_config_file: PathBuf,
    /// Directory of cached token and client-registration records.
    pub sso_cache_dir: PathBuf,
    /// Directory holding signal/lock/mode/cooldown state.
    pub state_dir: PathBuf,
    /// Signal file location (separate override so container producers can
    /// point it at a shared mount).
    pub signal_file: PathBuf,
    /// Watcher main poll interval.
    pub poll_interval: Duration,
    /// Minimum time between concluded login attempts.
    pub cooldown: Duration,
    /// Expiry-checker pass interval (`check --loop`).
    pub check_interval: Duration,
    /// Remaining lifetime below which the checker acts.
    pub renewal_threshold: Duration,
    /// How often the watcher runs its proactive expiry check.
    pub proactive_interval: Duration,
    /// Remaining lifetime below which the proactive path refreshes.
    pub proactive_window: Duration,
    /// Upper bound on an interactive login attempt.
    pub login_timeout: Duration,
    /// Upper bound on a single provider RPC.
    pub request_timeout: Duration,
    /// Environment-level mode default, validated lazily by the mode store.
    pub mode_env_default: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let aws_dir = aws_dir()?;
        let state_dir = match std::env::var("SSO_STATE_DIR") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => aws_dir.join(STATE_DIR_NAME),
        };
        let signal_file = match std::env::var("SSO_SIGNAL_FILE") {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => state_dir.join(SIGNAL_FILE),
        };
        let aws_config_file = match std::env::var("AWS_CONFIG_FILE") {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => aws_dir.join("config"),
        };
        let sso_cache_dir = match std::env::var("SSO_CACHE_DIR") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => aws_dir.join("sso").join("cache"),
        };

        Ok(Self {
            profile: std::env::var("AWS_PROFILE").unwrap_or_else(|_| "default".to_string()),
            aws_config_file,
            sso_cache_dir,
            state_dir,
            signal_file,
            poll_interval: env_seconds("SSO_POLL_SECONDS", 5),
            cooldown: env_seconds("SSO_COOLDOWN_SECONDS", 600),
            check_interval: env_seconds("CHECK_INTERVAL", 900),
            renewal_threshold: env_seconds("RENEWAL_THRESHOLD", 3600),
            proactive_interval: env_seconds("SSO_PROACTIVE_SECONDS", 300),
            proactive_window: env_seconds("SSO_PROACTIVE_WINDOW", 3600),
            login_timeout: env_seconds("SSO_LOGIN_TIMEOUT", 120),
            request_timeout: env_seconds("SSO_REQUEST_TIMEOUT", 30),
            mode_env_default: std::env::var("SSO_LOGIN_MODE").ok(),
        })
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.state_dir.join(LOCK_DIR)
    }

    pub fn cooldown_file(&self) -> PathBuf {
        self.state_dir.join(COOLDOWN_FILE)
    }

    pub fn mode_file(&self) -> PathBuf {
        self.state_dir.join(MODE_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }
}

fn aws_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".aws"))
}

/// Read a duration in whole seconds from the environment.
/// Unset or unparseable values fall back to the default.
fn env_seconds(key: &str, default: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_seconds_default() {
        assert_eq!(env_seconds("SSO_TEST_UNSET_VAR", 42), Duration::from_secs(42));
    }

    #[test]
    fn test_env_seconds_ignores_garbage() {
        std::env::set_var("SSO_TEST_GARBAGE_VAR", "not-a-number");
        assert_eq!(env_seconds("SSO_TEST_GARBAGE_VAR", 7), Duration::from_secs(7));
        std::env::remove_var("SSO_TEST_GARBAGE_VAR");
    }
}
