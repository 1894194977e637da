//! Credential expiry evaluation.
//!
//! `classify` is the pure decision (healthy / refresh needed / login
//! required); `ExpiryChecker::evaluate` resolves "refresh needed" through
//! the refresh client and keeps the signal file in sync with the outcome.
//! This runs as its own scheduled process; the signal file is its only
//! channel to the watcher.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::aws::resolve_sso_session;
use crate::refresh::TokenRefresher;
use crate::state::SignalChannel;
use crate::token::CachedToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// Plenty of lifetime left; nothing to do.
    Healthy,
    /// Within the renewal threshold; a silent refresh should be attempted.
    RefreshNeeded,
    /// No usable credential; only an interactive login can recover.
    LoginRequired,
}

/// Pure classification of a cached record against the renewal threshold.
///
/// The boundary is exclusive on the needs-action side: action triggers
/// only when strictly less time remains than the threshold.
pub fn classify(
    token: Option<&CachedToken>,
    now: DateTime<Utc>,
    renewal_threshold: Duration,
) -> TokenStatus {
    let Some(token) = token else {
        return TokenStatus::LoginRequired;
    };
    // A record without an expiry cannot be reasoned about
    let Some(remaining) = token.remaining(now) else {
        return TokenStatus::LoginRequired;
    };
    if remaining >= renewal_threshold {
        TokenStatus::Healthy
    } else {
        TokenStatus::RefreshNeeded
    }
}

pub struct ExpiryChecker {
    aws_config_file: PathBuf,
    refresher: TokenRefresher,
    signal: SignalChannel,
    renewal_threshold: Duration,
}

impl ExpiryChecker {
    pub fn new(
        aws_config_file: PathBuf,
        refresher: TokenRefresher,
        signal: SignalChannel,
        renewal_threshold: Duration,
    ) -> Self {
        Self {
            aws_config_file,
            refresher,
            signal,
            renewal_threshold,
        }
    }

    /// Run one evaluation pass for the profile and synchronize the signal
    /// file with the result. Never returns `RefreshNeeded`: that state is
    /// resolved here by attempting the refresh.
    pub async fn evaluate(&self, profile: &str) -> TokenStatus {
        let session = match resolve_sso_session(&self.aws_config_file, profile) {
            Ok(session) => session,
            Err(e) => {
                warn!(profile, error = %e, "cannot resolve SSO session");
                self.require_login(profile, &format!("configuration error: {}", e));
                return TokenStatus::LoginRequired;
            }
        };

        let token = self.refresher.store().find_token(&session.start_url);
        match classify(token.as_ref().map(|(_, t)| t), Utc::now(), self.renewal_threshold) {
            TokenStatus::Healthy => {
                info!(profile, "token healthy");
                self.signal.clear();
                TokenStatus::Healthy
            }
            TokenStatus::LoginRequired => {
                info!(profile, "no usable token, login required");
                self.require_login(profile, "no valid cached credential");
                TokenStatus::LoginRequired
            }
            TokenStatus::RefreshNeeded => match self.refresher.try_refresh(profile).await {
                Ok(()) => {
                    info!(profile, "token renewed before expiry");
                    self.signal.clear();
                    TokenStatus::Healthy
                }
                Err(e) => {
                    warn!(profile, error = %e, "silent refresh failed, login required");
                    self.require_login(profile, &format!("refresh failed: {}", e));
                    TokenStatus::LoginRequired
                }
            },
        }
    }

    fn require_login(&self, profile: &str, reason: &str) {
        if let Err(e) = self.signal.raise(profile, reason) {
            // Failing to signal means the watcher never hears about this;
            // the next pass retries.
            warn!(profile, error = %e, "failed to write signal file");
        }
    }
}
