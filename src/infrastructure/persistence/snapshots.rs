//! Atomic memory snapshots.
//!
//! Snapshots live at `<dir>/<name>_<epoch>.json`. Every write goes to a
//! sibling temp file first and is renamed into place, so a reader never
//! observes a half-written snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use crate::domain::errors::{BuildError, BuildResult};
use crate::domain::models::BuildMemory;

/// Write a snapshot atomically, returning its final path.
pub fn save_snapshot(memory: &BuildMemory, dir: &Path, name: &str) -> BuildResult<PathBuf> {
    fs::create_dir_all(dir)?;

    let epoch = Utc::now().timestamp_millis();
    let final_path = dir.join(format!("{name}_{epoch}.json"));
    let temp_path = dir.join(format!(".{name}_{epoch}.json.tmp"));

    let json = serde_json::to_string_pretty(memory)?;
    fs::write(&temp_path, json)?;
    fs::rename(&temp_path, &final_path)?;

    Ok(final_path)
}

/// Load the newest snapshot that parses.
///
/// Malformed snapshots are skipped (newest first) until one loads; when
/// none does, there is no resumable state.
pub fn load_latest_snapshot(dir: &Path) -> BuildResult<BuildMemory> {
    let mut candidates = snapshot_files(dir)?;
    if candidates.is_empty() {
        return Err(BuildError::NoResumableState);
    }
    candidates.sort_by_key(|(epoch, _)| std::cmp::Reverse(*epoch));

    for (_, path) in candidates {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<BuildMemory>(&contents) {
                Ok(memory) => {
                    debug!(path = %path.display(), "loaded snapshot");
                    return Ok(memory);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping corrupt snapshot");
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable snapshot");
            }
        }
    }

    Err(BuildError::NoResumableState)
}

/// Delete old snapshots beyond `retention`, never touching snapshots whose
/// name contains one of `protected_markers`.
pub fn prune_snapshots(
    dir: &Path,
    retention: usize,
    protected_markers: &[&str],
) -> BuildResult<()> {
    let mut candidates = snapshot_files(dir)?;
    candidates.sort_by_key(|(epoch, _)| std::cmp::Reverse(*epoch));

    let prunable: Vec<PathBuf> = candidates
        .into_iter()
        .map(|(_, path)| path)
        .filter(|path| {
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            !protected_markers.iter().any(|m| stem.contains(m))
        })
        .collect();

    for path in prunable.iter().skip(retention) {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "failed to prune snapshot");
        }
    }
    Ok(())
}

/// Enumerate `<name>_<epoch>.json` files with their epochs.
fn snapshot_files(dir: &Path) -> BuildResult<Vec<(i64, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem.starts_with('.') {
            continue;
        }
        let epoch = stem
            .rsplit('_')
            .next()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);
        files.push((epoch, path));
    }
    Ok(files)
}
