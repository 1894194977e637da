//! Interactive login seam.
//!
//! `CliLogin` shells out to the AWS CLI device-authorization flow; the
//! trait exists so watcher tests can script outcomes without a browser.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginResult {
    Success,
    Failed,
    TimedOut,
}

#[async_trait]
pub trait LoginLauncher: Send + Sync {
    async fn login(&self, profile: &str) -> LoginResult;
}

/// Runs `aws sso login --profile <profile>` with a hard timeout. A hung
/// browser flow must not wedge the watcher loop while the lock is held.
pub struct CliLogin {
    timeout: Duration,
}

impl CliLogin {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl LoginLauncher for CliLogin {
    async fn login(&self, profile: &str) -> LoginResult {
        info!(profile, "launching interactive login");
        let mut child = match Command::new("aws")
            .args(["sso", "login", "--profile", profile])
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(profile, error = %e, "could not start aws cli");
                return LoginResult::Failed;
            }
        };

        match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => LoginResult::Success,
            Ok(Ok(status)) => {
                warn!(profile, code = ?status.code(), "login command failed");
                LoginResult::Failed
            }
            Ok(Err(e)) => {
                warn!(profile, error = %e, "could not wait on login command");
                LoginResult::Failed
            }
            Err(_) => {
                warn!(profile, timeout_secs = self.timeout.as_secs(), "login timed out");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "could not kill timed-out login");
                }
                LoginResult::TimedOut
            }
        }
    }
}
