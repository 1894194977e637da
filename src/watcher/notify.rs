//! User-facing prompt seam.
//!
//! The watcher asks a `Notify` implementation what to do when a login is
//! required in notify mode. The default implementation covers headless
//! hosts where no prompt can be shown; desktop frontends plug in here.

use async_trait::async_trait;
use tracing::warn;

/// What the user (or the environment standing in for them) chose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyAction {
    /// Proceed with the interactive login now.
    Refresh,
    /// Ask again after this many seconds.
    Snooze(u64),
    /// Stop prompting until credentials change again.
    Suppress,
    /// Close the prompt without deciding; cooldown applies.
    Dismiss,
}

#[async_trait]
pub trait Notify: Send + Sync {
    async fn ask(&self, profile: &str) -> NotifyAction;
}

/// Fallback for hosts with no way to prompt: behaves like auto mode by
/// answering `Refresh` immediately.
pub struct HeadlessNotify;

#[async_trait]
impl Notify for HeadlessNotify {
    async fn ask(&self, profile: &str) -> NotifyAction {
        warn!(profile, "no prompt available, proceeding with login");
        NotifyAction::Refresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_headless_always_refreshes() {
        assert_eq!(HeadlessNotify.ask("work").await, NotifyAction::Refresh);
    }
}
