//! AWS shared-config resolution.
//!
//! This module maps a profile name to its SSO session parameters
//! (region, start URL, registration scopes) by reading `~/.aws/config`.

pub mod profile;

pub use profile::{resolve_sso_session, SsoSession};
