//! Silent token refresh.
//!
//! `TokenRefresher` drives the whole renewal path for one profile: resolve
//! the SSO session from config, locate the cached token record, pick a
//! usable client identity (embedded pair, cached registration, or a fresh
//! registration), exchange the refresh token, and persist the rotated
//! record atomically.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::aws::{resolve_sso_session, SsoSession};
use crate::error::SentinelError;
use crate::oidc::{SsoOidc, CLIENT_NAME};
use crate::token::{CachedToken, ClientRegistration, TokenStore};

pub struct TokenRefresher {
    aws_config_file: PathBuf,
    store: TokenStore,
    oidc: Arc<dyn SsoOidc>,
}

impl TokenRefresher {
    pub fn new(aws_config_file: PathBuf, store: TokenStore, oidc: Arc<dyn SsoOidc>) -> Self {
        Self {
            aws_config_file,
            store,
            oidc,
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Attempt a silent refresh for the profile. Ok means the token record
    /// on disk now holds a fresh access token.
    ///
    /// Secret values never appear in the returned errors or in logs; the
    /// only place they are written is the credential file itself.
    pub async fn try_refresh(&self, profile: &str) -> Result<(), SentinelError> {
        let session = resolve_sso_session(&self.aws_config_file, profile)?;

        let (path, mut token) = self
            .store
            .find_token(&session.start_url)
            .ok_or_else(|| SentinelError::CredentialMissing(session.start_url.clone()))?;

        let refresh_token = token
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(SentinelError::NoRefreshToken)?;

        let (client_id, client_secret) = self.resolve_client_identity(&session, &token).await?;

        let response = self
            .oidc
            .create_token(&session.region, &client_id, &client_secret, &refresh_token)
            .await?;

        token.access_token = response.access_token;
        token.expires_at = Some(Utc::now() + Duration::seconds(response.expires_in));
        if let Some(rotated) = response.refresh_token {
            if !rotated.is_empty() {
                token.refresh_token = Some(rotated);
            }
        }

        self.store.save_token(&path, &token)?;
        info!(
            profile,
            expires_at = %token.expires_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            "token refreshed"
        );
        Ok(())
    }

    /// Convenience wrapper for callers that only branch on success.
    /// All failure modes are logged here.
    pub async fn refresh(&self, profile: &str) -> bool {
        match self.try_refresh(profile).await {
            Ok(()) => true,
            Err(e) => {
                warn!(profile, error = %e, "silent refresh failed");
                false
            }
        }
    }

    /// Resolve a usable client identity, preferring the pair embedded in
    /// the token record, then a cached registration, then registering anew.
    /// Expired identities are treated as absent.
    async fn resolve_client_identity(
        &self,
        session: &SsoSession,
        token: &CachedToken,
    ) -> Result<(String, String), SentinelError> {
        let now = Utc::now();

        if token.embedded_client_usable(now) {
            debug!("using client identity embedded in token record");
            // embedded_client_usable guarantees both halves are present
            if let (Some(id), Some(secret)) = (&token.client_id, &token.client_secret) {
                return Ok((id.clone(), secret.clone()));
            }
        }

        if let Some(registration) = self
            .store
            .find_registration(&session.region, &session.start_url)
        {
            debug!("using cached client registration");
            return Ok((registration.client_id, registration.client_secret));
        }

        debug!(region = %session.region, "registering new OIDC client");
        let response = self
            .oidc
            .register_client(&session.region, CLIENT_NAME, &session.scopes)
            .await?;

        let registration = ClientRegistration {
            client_id: response.client_id.clone(),
            client_secret: response.client_secret.clone(),
            registration_expires_at: response
                .client_secret_expires_at
                .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0)),
            extra: serde_json::Map::new(),
        };
        // A registration that cannot be cached still works for this refresh;
        // the next run will just register again.
        if let Err(e) = self
            .store
            .save_registration(&session.region, &session.start_url, &registration)
        {
            warn!(error = %e, "could not cache client registration");
        }

        Ok((response.client_id, response.client_secret))
    }
}
