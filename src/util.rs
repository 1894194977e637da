//! Small filesystem helpers shared by the on-disk stores.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

/// Write a file atomically (write tmp + rename) so a concurrent reader never
/// observes a half-written file.
///
/// The temp name embeds the PID and a counter: concurrent saves racing on a
/// single shared `.tmp` name could otherwise leave trailing bytes from a
/// longer previous write.
pub fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
