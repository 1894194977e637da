//! The login-required signal file.
//!
//! At most one live signal exists per deployment. Credential producers
//! create it when silent renewal fails and remove it when credentials are
//! healthy again; the watcher only removes it on success or suppression.
//! Its presence is the sole trigger condition for the watcher.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SentinelError;
use crate::util::write_atomic;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Epoch seconds before which the watcher must not act on this signal.
    /// Shared by user snoozes and the 30-second failure retry hint.
    #[serde(rename = "nextAttemptAfter", default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_after: Option<f64>,

    /// Fields written by other producers; preserved verbatim on rewrite.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub struct SignalChannel {
    path: PathBuf,
}

impl SignalChannel {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the current signal. Missing or unparseable files read as absent
    /// (a corrupt signal must never wedge the loop).
    pub fn read(&self) -> Option<SignalRecord> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(file = %self.path.display(), error = %e, "ignoring corrupt signal file");
                None
            }
        }
    }

    /// Create or update the signal. Merges into an existing record so a
    /// pending `nextAttemptAfter` hint and fields written by other
    /// producers survive a re-raise.
    pub fn raise(&self, profile: &str, reason: &str) -> Result<(), SentinelError> {
        let mut record = self.read().unwrap_or_default();
        record.profile = Some(profile.to_string());
        record.reason = Some(reason.to_string());
        record.timestamp = Some(Utc::now());
        self.write(&record)
    }

    pub fn write(&self, record: &SignalRecord) -> Result<(), SentinelError> {
        let contents =
            serde_json::to_string_pretty(record).map_err(|e| SentinelError::Write(e.to_string()))?;
        write_atomic(&self.path, &contents)
            .map_err(|e| SentinelError::Write(format!("{}: {}", self.path.display(), e)))
    }

    /// Set `nextAttemptAfter = now + seconds` on the existing signal,
    /// preserving every other field. A missing or corrupt signal becomes a
    /// minimal record carrying only the hint.
    pub fn snooze(&self, seconds: u64) -> Result<(), SentinelError> {
        let mut record = self.read().unwrap_or_default();
        record.next_attempt_after = Some(epoch_now() + seconds as f64);
        self.write(&record)
    }

    /// Remove the signal. Idempotent: clearing an absent signal is a no-op.
    pub fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(file = %self.path.display(), "signal cleared"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(file = %self.path.display(), error = %e, "failed to clear signal"),
        }
    }
}

/// Current time as float epoch seconds, the `nextAttemptAfter` unit.
pub fn epoch_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (tempfile::TempDir, SignalChannel) {
        let dir = tempfile::tempdir().unwrap();
        let channel = SignalChannel::new(dir.path().join("login-required.json"));
        (dir, channel)
    }

    #[test]
    fn test_raise_and_read() {
        let (_dir, channel) = channel();
        channel.raise("dev", "refresh failed").unwrap();
        let record = channel.read().unwrap();
        assert_eq!(record.profile.as_deref(), Some("dev"));
        assert_eq!(record.reason.as_deref(), Some("refresh failed"));
        assert!(record.timestamp.is_some());
        assert!(record.next_attempt_after.is_none());
    }

    #[test]
    fn test_clear_absent_is_noop() {
        let (_dir, channel) = channel();
        channel.clear();
        assert!(!channel.exists());
    }

    #[test]
    fn test_clear_removes_file() {
        let (_dir, channel) = channel();
        channel.raise("dev", "x").unwrap();
        assert!(channel.exists());
        channel.clear();
        assert!(!channel.exists());
    }

    #[test]
    fn test_snooze_preserves_unknown_fields() {
        let (_dir, channel) = channel();
        std::fs::write(
            channel.path(),
            serde_json::json!({
                "profile": "dev",
                "reason": "expired",
                "source": "sso-monitor-container"
            })
            .to_string(),
        )
        .unwrap();

        channel.snooze(900).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(channel.path()).unwrap()).unwrap();
        assert_eq!(raw["profile"], "dev");
        assert_eq!(raw["source"], "sso-monitor-container");
        let next = raw["nextAttemptAfter"].as_f64().unwrap();
        let now = epoch_now();
        assert!(next > now + 890.0 && next < now + 910.0);
    }

    #[test]
    fn test_snooze_overwrites_existing_hint() {
        let (_dir, channel) = channel();
        channel.raise("dev", "x").unwrap();
        channel.snooze(900).unwrap();
        channel.snooze(30).unwrap();
        let record = channel.read().unwrap();
        let next = record.next_attempt_after.unwrap();
        assert!(next < epoch_now() + 60.0);
    }

    #[test]
    fn test_raise_preserves_pending_hint() {
        let (_dir, channel) = channel();
        channel.raise("dev", "expired").unwrap();
        channel.snooze(900).unwrap();

        channel.raise("dev", "still expired").unwrap();

        let record = channel.read().unwrap();
        assert_eq!(record.reason.as_deref(), Some("still expired"));
        assert!(record.next_attempt_after.is_some());
    }

    #[test]
    fn test_corrupt_signal_reads_as_absent() {
        let (_dir, channel) = channel();
        std::fs::write(channel.path(), "not json {{{").unwrap();
        assert!(channel.read().is_none());
        // exists() still reports the file so producers can overwrite it
        assert!(channel.exists());
    }
}
