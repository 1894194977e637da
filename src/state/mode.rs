//! Persisted watcher mode.
//!
//! The mode file is re-read on every orchestrator iteration so runtime
//! toggles take effect without a restart. Invalid persisted or
//! environment values are ignored, never fatal.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::debug;

use crate::error::SentinelError;

/// Watcher behavior toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Ask the user before any interactive login (default).
    Notify,
    /// Escalate to automatic login without asking.
    Auto,
    /// Silent refresh only; never escalate.
    Silent,
    /// All automation off; the user handles logins manually.
    Standalone,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Notify, Mode::Auto, Mode::Silent, Mode::Standalone];
}

impl FromStr for Mode {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "notify" => Ok(Mode::Notify),
            "auto" => Ok(Mode::Auto),
            "silent" => Ok(Mode::Silent),
            "standalone" => Ok(Mode::Standalone),
            other => Err(SentinelError::Config(format!(
                "invalid mode '{}' (expected notify|auto|silent|standalone)",
                other
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Notify => "notify",
            Mode::Auto => "auto",
            Mode::Silent => "silent",
            Mode::Standalone => "standalone",
        };
        f.write_str(s)
    }
}

pub struct ModeStore {
    path: PathBuf,
    env_default: Option<String>,
}

impl ModeStore {
    pub fn new(path: PathBuf, env_default: Option<String>) -> Self {
        Self { path, env_default }
    }

    /// Read priority: valid persisted file, else valid environment default,
    /// else `notify`.
    pub fn read(&self) -> Mode {
        if let Ok(contents) = std::fs::read_to_string(&self.path) {
            if let Ok(mode) = contents.parse::<Mode>() {
                return mode;
            }
            debug!(file = %self.path.display(), "ignoring invalid mode file");
        }
        if let Some(raw) = &self.env_default {
            if let Ok(mode) = raw.parse::<Mode>() {
                return mode;
            }
            debug!(value = %raw, "ignoring invalid mode environment default");
        }
        Mode::Notify
    }

    /// Persist a mode. The closed enum makes invalid values
    /// unrepresentable; CLI input goes through `Mode::from_str` first.
    pub fn write(&self, mode: Mode) -> Result<(), SentinelError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SentinelError::Write(format!("{}: {}", parent.display(), e)))?;
        }
        std::fs::write(&self.path, format!("{}\n", mode))
            .map_err(|e| SentinelError::Write(format!("{}: {}", self.path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(env_default: Option<&str>) -> (tempfile::TempDir, ModeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ModeStore::new(
            dir.path().join("mode"),
            env_default.map(|s| s.to_string()),
        );
        (dir, store)
    }

    #[test]
    fn test_read_from_file() {
        let (dir, store) = store(None);
        std::fs::write(dir.path().join("mode"), "auto\n").unwrap();
        assert_eq!(store.read(), Mode::Auto);
    }

    #[test]
    fn test_read_standalone() {
        let (dir, store) = store(None);
        std::fs::write(dir.path().join("mode"), "standalone\n").unwrap();
        assert_eq!(store.read(), Mode::Standalone);
    }

    #[test]
    fn test_falls_back_to_env_default() {
        let (_dir, store) = store(Some("silent"));
        assert_eq!(store.read(), Mode::Silent);
    }

    #[test]
    fn test_default_is_notify() {
        let (_dir, store) = store(None);
        assert_eq!(store.read(), Mode::Notify);
    }

    #[test]
    fn test_invalid_file_falls_through() {
        let (dir, store) = store(Some("auto"));
        std::fs::write(dir.path().join("mode"), "bogus\n").unwrap();
        assert_eq!(store.read(), Mode::Auto);
    }

    #[test]
    fn test_invalid_env_falls_to_notify() {
        let (_dir, store) = store(Some("bogus"));
        assert_eq!(store.read(), Mode::Notify);
    }

    #[test]
    fn test_write_round_trip() {
        let (dir, store) = store(None);
        store.write(Mode::Standalone).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("mode")).unwrap().trim(),
            "standalone"
        );
        assert_eq!(store.read(), Mode::Standalone);
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!("bogus".parse::<Mode>().is_err());
        for mode in Mode::ALL {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        }
    }
}
