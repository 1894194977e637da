//! Last-login-attempt timestamp.
//!
//! Written when any login attempt concludes (success, dismiss, suppress)
//! to stop repeated prompts. Distinct from the snooze hint in the signal
//! record, which is attempt-specific.

use std::path::PathBuf;

use tracing::warn;

use crate::error::SentinelError;
use crate::state::signal::epoch_now;

pub struct CooldownFile {
    path: PathBuf,
}

impl CooldownFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read the last attempt timestamp. Missing or corrupt files read as
    /// "never attempted".
    pub fn read(&self) -> Option<f64> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        contents.trim().parse::<f64>().ok()
    }

    pub fn write(&self, timestamp: f64) -> Result<(), SentinelError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SentinelError::Write(format!("{}: {}", parent.display(), e)))?;
        }
        std::fs::write(&self.path, format!("{}\n", timestamp))
            .map_err(|e| SentinelError::Write(format!("{}: {}", self.path.display(), e)))
    }

    /// Record "an attempt concluded just now". Failures are logged, not
    /// propagated: a missing cooldown only means an earlier re-prompt.
    pub fn touch(&self) {
        if let Err(e) = self.write(epoch_now()) {
            warn!(error = %e, "failed to write cooldown timestamp");
        }
    }

    /// Whether the cooldown window has passed (or no attempt is recorded).
    pub fn elapsed(&self, cooldown_seconds: f64) -> bool {
        match self.read() {
            Some(last) => epoch_now() - last >= cooldown_seconds,
            None => true,
        }
    }
}
