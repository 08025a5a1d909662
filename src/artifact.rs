//! Model artifact selection.
//!
//! An explicit path wins when it resolves (symlinks followed to an existing
//! target). Otherwise the newest file matching the artifact pattern in the
//! models directory is used.

use crate::config::ModelSettings;
use crate::error::EstimateError;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Resolve which artifact file to load.
pub fn resolve_model_path(settings: &ModelSettings) -> Result<PathBuf, EstimateError> {
    if let Some(explicit) = settings.model_path.as_deref() {
        match fs::canonicalize(explicit) {
            Ok(resolved) if resolved.is_file() => {
                debug!(path = %resolved.display(), "using explicit model path");
                return Ok(resolved);
            }
            Ok(resolved) => {
                warn!(path = %resolved.display(), "explicit model path is not a file, searching models dir");
            }
            Err(e) => {
                warn!(path = %explicit.display(), error = %e, "explicit model path does not resolve, searching models dir");
            }
        }
    }

    newest_matching(&settings.models_dir, &settings.artifact_pattern)?.ok_or_else(|| {
        EstimateError::ModelNotFound {
            explicit: settings
                .model_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string()),
            searched: settings.models_dir.clone(),
        }
    })
}

/// Most recently modified file under `dir` matching `pattern`.
fn newest_matching(dir: &Path, pattern: &str) -> Result<Option<PathBuf>, EstimateError> {
    let full = dir.join(pattern);
    let full = full.to_str().ok_or_else(|| {
        EstimateError::Config(format!("models path {} is not valid UTF-8", full.display()))
    })?;
    let entries = glob::glob(full)
        .map_err(|e| EstimateError::Config(format!("bad artifact pattern `{pattern}`: {e}")))?;

    let mut best: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "skipping unreadable artifact candidate");
                continue;
            }
        };
        // Dangling symlinks and directories are not candidates.
        let Ok(meta) = fs::metadata(&path) else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if best.as_ref().map_or(true, |(t, _)| modified > *t) {
            best = Some((modified, path));
        }
    }

    match best {
        Some((_, path)) => {
            let resolved = fs::canonicalize(&path).unwrap_or(path);
            debug!(path = %resolved.display(), "selected newest model artifact");
            Ok(Some(resolved))
        }
        None => Ok(None),
    }
}
