//! Environment/runtime helpers
//!
//! Sanity checks run once at startup before the store is touched.

use std::path::Path;

use tracing::{info, warn};

/// Ensure the parent directory of every given data file exists.
/// Sentinel paths (see `is_sentinel`) are skipped.
pub async fn ensure_data_dirs<P: AsRef<Path>>(files: &[P], is_sentinel: fn(&Path) -> bool) -> anyhow::Result<()> {
    for file in files {
        let file = file.as_ref();
        if is_sentinel(file) {
            info!(path = %file.display(), "persistence disabled for file");
            continue;
        }
        let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) else { continue };
        if tokio::fs::metadata(parent).await.is_err() {
            warn!(dir = %parent.display(), "data directory missing; creating it");
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| anyhow::anyhow!("cannot create {}: {e}", parent.display()))?;
        }
    }
    Ok(())
}

/// Name of the host serving requests, `Unknown` when it cannot be resolved.
pub fn worker_name() -> String {
    if let Ok(h) = std::env::var("HOSTNAME") {
        if !h.trim().is_empty() {
            return h.trim().to_string();
        }
    }
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Unknown".to_string())
}
