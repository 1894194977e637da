//! Network implementation of the SSO OIDC contract.
//!
//! Endpoints are regional: `https://oidc.{region}.amazonaws.com`, JSON
//! bodies with camelCase parameters. Requests are unsigned (the OIDC
//! surface authenticates via the client identity in the body).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::SentinelError;

use super::{CreateTokenResponse, RegisterClientResponse, SsoOidc};

/// Error body shape the OIDC endpoints return on non-2xx responses.
#[derive(Debug, Deserialize)]
struct OidcErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "error_description")]
    error_description: Option<String>,
}

pub struct HttpSsoOidc {
    client: Client,
}

impl HttpSsoOidc {
    pub fn new(request_timeout: Duration) -> Result<Self, SentinelError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client })
    }

    fn endpoint(region: &str, path: &str) -> String {
        format!("https://oidc.{}.amazonaws.com/{}", region, path)
    }

    /// Map a non-success response to the taxonomy, distinguishing the dead
    /// refresh grant from everything retryable.
    async fn error_from_response(response: reqwest::Response) -> SentinelError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        let parsed = serde_json::from_str::<OidcErrorBody>(&body).ok();
        let grant_dead = parsed
            .as_ref()
            .and_then(|e| e.error.as_deref())
            .map(|code| code == "invalid_grant" || code == "expired_token")
            .unwrap_or(false)
            || body.contains("InvalidGrantException")
            || body.contains("ExpiredTokenException");

        let detail = match parsed.and_then(|e| e.error_description) {
            Some(description) => format!("{}: {}", status, description),
            None => format!("{}: {}", status, SentinelError::truncate_body(&body)),
        };
        if grant_dead {
            SentinelError::GrantInvalid(detail)
        } else {
            SentinelError::Transport(detail)
        }
    }
}

#[async_trait]
impl SsoOidc for HttpSsoOidc {
    async fn register_client(
        &self,
        region: &str,
        client_name: &str,
        scopes: &[String],
    ) -> Result<RegisterClientResponse, SentinelError> {
        let url = Self::endpoint(region, "client/register");
        debug!(region, client_name, "registering OIDC client");

        let payload = serde_json::json!({
            "clientName": client_name,
            "clientType": super::CLIENT_TYPE,
            "scopes": scopes,
        });

        let response = self.client.post(&url).json(&payload).send().await?;
        if !response.status().is_success() {
            let err = Self::error_from_response(response).await;
            warn!(region, error = %err, "client registration failed");
            return Err(err);
        }

        let registration: RegisterClientResponse = response
            .json()
            .await
            .map_err(|e| SentinelError::Transport(format!("bad RegisterClient response: {}", e)))?;
        Ok(registration)
    }

    async fn create_token(
        &self,
        region: &str,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<CreateTokenResponse, SentinelError> {
        let url = Self::endpoint(region, "token");
        debug!(region, "requesting token refresh");

        let payload = serde_json::json!({
            "grantType": "refresh_token",
            "clientId": client_id,
            "clientSecret": client_secret,
            "refreshToken": refresh_token,
        });

        let response = self.client.post(&url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let token: CreateTokenResponse = response
            .json()
            .await
            .map_err(|e| SentinelError::Transport(format!("bad CreateToken response: {}", e)))?;

        if token.access_token.is_empty() {
            return Err(SentinelError::Transport(
                "CreateToken response contains no access token".to_string(),
            ));
        }
        Ok(token)
    }
}
