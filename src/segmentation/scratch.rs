//! Per-invocation scratch directories.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::QuantError;

/// Name prefix of every scratch directory.
pub const SCRATCH_PREFIX: &str = "cellpose-";

/// Scratch entries untouched for this long belong to a crashed run. Younger
/// ones may be in use by another roiquant process sharing the root.
pub const STALE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// Creates a fresh, uniquely named scratch directory under `root`.
///
/// Leftovers from a crashed earlier run (`cellpose-*` entries directly in
/// `root` older than [`STALE_AFTER`]) are removed first. The returned guard
/// deletes the directory and its contents when dropped.
pub fn create_scratch_dir(root: &Path) -> Result<TempDir, QuantError> {
    fs::create_dir_all(root)?;
    sweep_stale(root, SystemTime::now());

    let dir = tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempdir_in(root)?;
    debug!(path = %dir.path().display(), "created scratch directory");
    Ok(dir)
}

/// Removes scratch entries last modified more than [`STALE_AFTER`] before
/// `now`. Failures are logged, not returned.
fn sweep_stale(root: &Path, now: SystemTime) -> usize {
    let mut removed = 0;
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
    {
        let is_scratch = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(SCRATCH_PREFIX));
        if !is_scratch {
            continue;
        }
        let age = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|modified| now.duration_since(modified).ok());
        if !age.is_some_and(|age| age > STALE_AFTER) {
            continue;
        }

        let result = if entry.file_type().is_dir() {
            fs::remove_dir_all(entry.path())
        } else {
            fs::remove_file(entry.path())
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %entry.path().display(), error = %e, "could not remove stale scratch entry"),
        }
    }
    if removed > 0 {
        debug!(removed, "swept stale scratch entries");
    }
    removed
}
