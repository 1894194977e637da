//! File-based coordination primitives.
//!
//! Independent processes with no shared memory agree through these four
//! files in the state directory:
//! - `SignalChannel`: "login is required" mailbox with a retry hint
//! - `LoginLock`: directory-based mutual exclusion for login flows
//! - `ModeStore`: persisted watcher behavior toggle
//! - `CooldownFile`: timestamp of the last concluded login attempt

pub mod cooldown;
pub mod lock;
pub mod mode;
pub mod signal;

pub use cooldown::CooldownFile;
pub use lock::LoginLock;
pub use mode::{Mode, ModeStore};
pub use signal::{epoch_now, SignalChannel, SignalRecord};
