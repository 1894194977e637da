//! Profile-to-SSO-session resolution from the AWS shared config file.
//!
//! The config file is INI-shaped: `[profile <name>]` sections reference a
//! `[sso-session <name>]` block carrying the start URL, region, and
//! registration scopes. Only that narrow dialect is read here - sections,
//! `key = value` pairs, and `#`/`;` comments.

use std::collections::HashMap;
use std::path::Path;

use crate::error::SentinelError;

/// Scope requested at client registration when the session block names none
const DEFAULT_REGISTRATION_SCOPE: &str = "sso:account:access";

/// Connection parameters for one SSO session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoSession {
    pub session_name: String,
    pub start_url: String,
    pub region: String,
    pub scopes: Vec<String>,
}

/// Resolve the SSO session configuration for a profile.
///
/// Fails with `Config` if the profile is absent, lacks an `sso_session`
/// reference, the referenced session block is absent, or the block is
/// missing its start URL or region. Pure read, no side effects.
pub fn resolve_sso_session(config_file: &Path, profile: &str) -> Result<SsoSession, SentinelError> {
    let contents = std::fs::read_to_string(config_file).map_err(|e| {
        SentinelError::Config(format!(
            "cannot read AWS config {}: {}",
            config_file.display(),
            e
        ))
    })?;

    let sections = parse_ini(&contents);

    // "[profile x]" is the documented form; a bare "[x]" section is accepted
    // the way the AWS CLI accepts "[default]".
    let profile_section = sections
        .get(&format!("profile {}", profile))
        .or_else(|| sections.get(profile))
        .ok_or_else(|| {
            SentinelError::Config(format!("profile '{}' not found in AWS config", profile))
        })?;

    let session_name = profile_section.get("sso_session").cloned().ok_or_else(|| {
        SentinelError::Config(format!("profile '{}' is missing 'sso_session'", profile))
    })?;

    let session_section = sections
        .get(&format!("sso-session {}", session_name))
        .ok_or_else(|| {
            SentinelError::Config(format!("SSO session '{}' not found in AWS config", session_name))
        })?;

    let start_url = session_section.get("sso_start_url").cloned().ok_or_else(|| {
        SentinelError::Config(format!("SSO session '{}' is missing 'sso_start_url'", session_name))
    })?;
    let region = session_section.get("sso_region").cloned().ok_or_else(|| {
        SentinelError::Config(format!("SSO session '{}' is missing 'sso_region'", session_name))
    })?;

    let scopes = match session_section.get("sso_registration_scopes") {
        Some(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => vec![DEFAULT_REGISTRATION_SCOPE.to_string()],
    };

    Ok(SsoSession {
        session_name,
        start_url,
        region,
        scopes,
    })
}

/// Parse INI sections into nested maps. Lines that fit no shape are skipped,
/// so a corrupt file degrades to "no sections found" rather than an error.
fn parse_ini(contents: &str) -> HashMap<String, HashMap<String, String>> {
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current: Option<String> = None;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            let name = line[1..line.len() - 1].trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        if let (Some(section), Some(eq)) = (&current, line.find('=')) {
            let key = line[..eq].trim().to_string();
            let value = line[eq + 1..].trim().to_string();
            if !key.is_empty() {
                if let Some(map) = sections.get_mut(section) {
                    map.insert(key, value);
                }
            }
        }
    }

    sections
}
