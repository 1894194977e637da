use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::error::SentinelError;
use crate::util::write_atomic;

/// Cached credential record for one provider session.
///
/// Mutated in place by every silent refresh; never deleted (expiry is
/// implicit via time). Unknown fields survive a read-modify-write cycle
/// through the flattened `extra` map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedToken {
    #[serde(rename = "startUrl", default, skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(rename = "accessToken")]
    pub access_token: String,

    #[serde(
        rename = "expiresAt",
        default,
        with = "expiry_format",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(rename = "refreshToken", default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Client identity issued alongside the token at interactive login.
    /// Preferred over a separately cached registration when present.
    #[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(rename = "clientSecret", default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(
        rename = "registrationExpiresAt",
        default,
        with = "expiry_format",
        skip_serializing_if = "Option::is_none"
    )]
    pub registration_expires_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CachedToken {
    /// Time left before the access token expires. None when the record
    /// carries no expiry (such a record cannot be reasoned about).
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.expires_at.map(|at| at - now)
    }

    /// Whether the embedded client identity is usable: both halves present
    /// and the registration (when dated) not yet expired.
    pub fn embedded_client_usable(&self, now: DateTime<Utc>) -> bool {
        if self.client_id.is_none() || self.client_secret.is_none() {
            return false;
        }
        match self.registration_expires_at {
            Some(at) => at > now,
            None => true,
        }
    }
}

/// Cached OAuth public-client registration for one region + start URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistration {
    #[serde(rename = "clientId")]
    pub client_id: String,

    #[serde(rename = "clientSecret")]
    pub client_secret: String,

    #[serde(
        rename = "registrationExpiresAt",
        default,
        with = "expiry_format",
        skip_serializing_if = "Option::is_none"
    )]
    pub registration_expires_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ClientRegistration {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.registration_expires_at {
            Some(at) => at <= now,
            // Undated registrations cannot be validated; treat as expired
            // so a fresh one is obtained.
            None => true,
        }
    }
}

/// File-backed store of cached tokens and client registrations.
pub struct TokenStore {
    cache_dir: PathBuf,
}

impl TokenStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Stable cache key for a start URL: SHA-1 hex, matching the file names
    /// other cache consumers expect.
    pub fn cache_key(start_url: &str) -> String {
        hex::encode(Sha1::digest(start_url.as_bytes()))
    }

    pub fn token_path(&self, start_url: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", Self::cache_key(start_url)))
    }

    pub fn registration_path(&self, region: &str, start_url: &str) -> PathBuf {
        self.cache_dir.join(format!(
            "botocore-client-id-{}-{}.json",
            region,
            Self::cache_key(start_url)
        ))
    }

    /// Scan the cache directory for the token record matching a start URL.
    ///
    /// Interactive logins write records under names this process does not
    /// control, so the lookup scans rather than trusting the hashed path.
    /// Corrupt neighbors are skipped; registration records have no
    /// `startUrl` and never match.
    pub fn find_token(&self, start_url: &str) -> Option<(PathBuf, CachedToken)> {
        let entries = match std::fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.cache_dir.display(), error = %e, "cannot read SSO cache dir");
                return None;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.load_token(&path) {
                Ok(token) if token.start_url.as_deref() == Some(start_url) => {
                    return Some((path, token));
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(file = %path.display(), error = %e, "skipping unreadable cache file");
                }
            }
        }
        None
    }

    pub fn load_token(&self, path: &Path) -> Result<CachedToken, SentinelError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SentinelError::CredentialMalformed(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| SentinelError::CredentialMalformed(format!("{}: {}", path.display(), e)))
    }

    /// Persist a token record atomically (write-then-rename).
    pub fn save_token(&self, path: &Path, token: &CachedToken) -> Result<(), SentinelError> {
        let contents = serde_json::to_string_pretty(token)
            .map_err(|e| SentinelError::Write(e.to_string()))?;
        write_atomic(path, &contents)
            .map_err(|e| SentinelError::Write(format!("{}: {}", path.display(), e)))
    }

    /// Look up a usable cached client registration. Missing, corrupt, or
    /// expired registrations all read as absent.
    pub fn find_registration(&self, region: &str, start_url: &str) -> Option<ClientRegistration> {
        let path = self.registration_path(region, start_url);
        let contents = std::fs::read_to_string(&path).ok()?;
        let registration: ClientRegistration = match serde_json::from_str(&contents) {
            Ok(reg) => reg,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "ignoring corrupt client registration");
                return None;
            }
        };
        if registration.is_expired(Utc::now()) {
            debug!(file = %path.display(), "cached client registration expired");
            return None;
        }
        Some(registration)
    }

    pub fn save_registration(
        &self,
        region: &str,
        start_url: &str,
        registration: &ClientRegistration,
    ) -> Result<(), SentinelError> {
        let path = self.registration_path(region, start_url);
        let contents = serde_json::to_string_pretty(registration)
            .map_err(|e| SentinelError::Write(e.to_string()))?;
        write_atomic(&path, &contents)
            .map_err(|e| SentinelError::Write(format!("{}: {}", path.display(), e)))
    }
}

/// Serde for the provider's timestamp format.
///
/// Writes `%Y-%m-%dT%H:%M:%SZ` (what the provider and other cache consumers
/// emit); reads any RFC 3339 flavor since registrations in the wild carry
/// fractional seconds and `+00:00` offsets.
mod expiry_format {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) => parse(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", s))),
        }
    }

    pub(super) fn parse(s: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        // Python isoformat() without an offset, suffixed with a literal Z
        let trimmed = s.strip_suffix('Z').unwrap_or(s);
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(naive.and_utc());
        }
        None
    }
}
