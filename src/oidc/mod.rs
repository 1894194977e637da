//! Typed client for the SSO OIDC endpoints.
//!
//! Two RPCs matter here: `RegisterClient` (one-time public-client creation)
//! and `CreateToken` with the `refresh_token` grant. The trait seam exists
//! so the refresh path can be driven by a fake in tests; the network
//! implementation lives in `http`.

pub mod http;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::SentinelError;

pub use http::HttpSsoOidc;

/// Client name sent at registration
pub const CLIENT_NAME: &str = "sso-sentinel";

/// Registered client type; public clients hold no pre-shared secret
pub const CLIENT_TYPE: &str = "public";

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterClientResponse {
    #[serde(rename = "clientId")]
    pub client_id: String,

    #[serde(rename = "clientSecret")]
    pub client_secret: String,

    #[serde(rename = "clientIdIssuedAt", default)]
    pub client_id_issued_at: Option<i64>,

    /// Epoch seconds after which the registration must not be used.
    #[serde(rename = "clientSecretExpiresAt", default)]
    pub client_secret_expires_at: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTokenResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,

    /// Rotated refresh token; absent means keep using the old one.
    #[serde(rename = "refreshToken", default)]
    pub refresh_token: Option<String>,

    /// Access-token lifetime in seconds.
    #[serde(rename = "expiresIn")]
    pub expires_in: i64,
}

/// Identity-provider RPC contract.
///
/// Implementations must surface a grant-invalid failure (`GrantInvalid`)
/// distinguishably from generic transport errors: the former is terminal
/// for silent renewal, the latter is retryable.
#[async_trait]
pub trait SsoOidc: Send + Sync {
    async fn register_client(
        &self,
        region: &str,
        client_name: &str,
        scopes: &[String],
    ) -> Result<RegisterClientResponse, SentinelError>;

    async fn create_token(
        &self,
        region: &str,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<CreateTokenResponse, SentinelError>;
}
