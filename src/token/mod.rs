//! On-disk token store.
//!
//! This module owns the cached credential records the rest of the system
//! coordinates around:
//! - `CachedToken`: one access/refresh token pair per provider start URL
//! - `ClientRegistration`: OAuth public-client credentials per region + URL
//!
//! Files live in the shared SSO cache directory and stay byte-compatible
//! with other consumers of the same cache.

pub mod store;

pub use store::{CachedToken, ClientRegistration, TokenStore};
