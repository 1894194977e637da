use thiserror::Error;

/// Component-level error taxonomy.
///
/// Every failure the orchestrator can observe maps onto one of these
/// variants; nothing propagates uncaught out of a polling iteration.
#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no cached credential found for start URL {0}")]
    CredentialMissing(String),

    #[error("cached credential is malformed: {0}")]
    CredentialMalformed(String),

    #[error("credential has no refresh token - session was never set up for silent renewal")]
    NoRefreshToken,

    #[error("refresh grant rejected by the provider: {0}")]
    GrantInvalid(String),

    #[error("provider transport error: {0}")]
    Transport(String),

    #[error("failed to persist state: {0}")]
    Write(String),
}

/// Maximum length for provider response bodies echoed into error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl SentinelError {
    /// Truncate a response body to avoid dragging huge payloads into logs.
    /// The cut backs off to a char boundary; bodies are arbitrary provider
    /// text and may hold multibyte characters at the limit.
    pub fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut cut = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!(
            "{}... (truncated, {} total bytes)",
            &body[..cut],
            body.len()
        )
    }

    /// Whether this failure means the refresh grant itself is dead and only
    /// an interactive login can recover.
    #[cfg(test)]
    pub fn is_grant_invalid(&self) -> bool {
        matches!(self, SentinelError::GrantInvalid(_))
    }
}

impl From<reqwest::Error> for SentinelError {
    fn from(err: reqwest::Error) -> Self {
        SentinelError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body_short() {
        assert_eq!(SentinelError::truncate_body("short"), "short");
    }

    #[test]
    fn test_truncate_body_long() {
        let long = "x".repeat(600);
        let truncated = SentinelError::truncate_body(&long);
        assert!(truncated.contains("truncated, 600 total bytes"));
        assert!(truncated.len() < 600);
    }

    #[test]
    fn test_truncate_body_multibyte_boundary() {
        // 600 bytes of 3-byte chars puts the limit mid-character
        let body = "\u{20ac}".repeat(200);
        let truncated = SentinelError::truncate_body(&body);
        assert!(truncated.contains("truncated, 600 total bytes"));
        assert!(truncated.starts_with('\u{20ac}'));
    }

    #[test]
    fn test_is_grant_invalid() {
        assert!(SentinelError::GrantInvalid("invalid_grant".into()).is_grant_invalid());
        assert!(!SentinelError::Transport("timeout".into()).is_grant_invalid());
    }
}
