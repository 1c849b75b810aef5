//! Live detection-parameter reloads from the config file

use crate::config;
use crate::vision::ParameterHandle;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};

/// Re-read `[producer.detection]` from `path` and publish it through `handle`.
///
/// On a read or parse failure the previous parameters stay in effect.
pub fn reload_from(path: &Path, handle: &ParameterHandle) -> bool {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            log::warn!("Could not re-read {}: {e}", path.display());
            return false;
        }
    };
    match config::detection_from_toml(&content) {
        Ok(params) => {
            if params != handle.current() {
                log::info!("Detection parameters reloaded: {:?}", params);
                handle.set_parameters(params);
            }
            true
        }
        Err(e) => {
            log::warn!("Keeping previous detection parameters: {e}");
            false
        }
    }
}

/// Watches the config file and republishes detection parameters on change.
/// Watching stops when this is dropped.
pub struct ParameterReloader {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl ParameterReloader {
    pub fn watch(path: impl AsRef<Path>, handle: ParameterHandle) -> Result<Self> {
        let path = path
            .as_ref()
            .canonicalize()
            .context("Failed to canonicalize config path")?;
        // Editors often replace the file, so watch its directory.
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .context("Config path has no parent directory")?;

        let target = path.clone();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            let Ok(event) = result else {
                return;
            };
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                return;
            }
            if event.paths.iter().any(|p| p.file_name() == target.file_name()) {
                reload_from(&target, &handle);
            }
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        log::info!("Watching {} for parameter changes", path.display());
        Ok(Self {
            _watcher: watcher,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
