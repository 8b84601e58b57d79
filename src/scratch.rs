//! Scratch directory and cache redirection for the conversion stack.
//!
//! Model downloads and cache writes must never land in the invoking user's
//! home directory, which may be read-only for a sandboxed server process.
//! Everything is pointed at one tree under the system temp directory instead.

use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Environment redirections: variable name and subdirectory under the
/// scratch root. An empty subdirectory means the root itself.
const REDIRECTIONS: &[(&str, &str)] = &[
    ("HOME", ""),
    ("TESSDATA_PREFIX", "tessdata"),
    ("PDF2MD_ARTIFACTS_PATH", "artifacts"),
    ("HF_HOME", "huggingface"),
    ("HF_HUB_CACHE", "huggingface/cache"),
    ("HF_DATASETS_CACHE", "huggingface/datasets"),
    ("TRANSFORMERS_CACHE", "huggingface/transformers"),
];

/// Root of the scratch tree.
pub fn scratch_root() -> PathBuf {
    env::temp_dir().join("pdf2md-mcp")
}

/// Create the scratch tree and point every cache/home variable into it.
///
/// Idempotent. Creation failures are logged and tolerated here;
/// [`artifacts_path`] re-checks the directory that actually matters before
/// each conversion.
pub fn prepare() {
    let root = scratch_root();
    for (var, sub) in REDIRECTIONS {
        let path = if sub.is_empty() {
            root.clone()
        } else {
            root.join(sub)
        };
        if let Err(e) = fs::create_dir_all(&path) {
            tracing::warn!(
                directory = %path.display(),
                error = %e,
                "failed to create scratch directory"
            );
        }
        env::set_var(var, &path);
    }
    tracing::debug!(root = %root.display(), "scratch environment prepared");
}

/// Resolve the artifacts directory for one conversion.
///
/// Honors `PDF2MD_ARTIFACTS_PATH` when set, defaulting to the scratch tree.
/// A permission failure creating it retries once under
/// `<tmp>/pdf2md_artifacts_<user>`.
pub fn artifacts_path() -> Result<PathBuf> {
    let primary = env::var_os("PDF2MD_ARTIFACTS_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| scratch_root().join("artifacts"));

    match fs::create_dir_all(&primary) {
        Ok(()) => Ok(primary),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            let user = env::var("USER")
                .or_else(|_| env::var("USERNAME"))
                .unwrap_or_else(|_| "default".to_string());
            let fallback = env::temp_dir().join(format!("pdf2md_artifacts_{user}"));
            tracing::warn!(
                primary = %primary.display(),
                fallback = %fallback.display(),
                "artifacts directory not writable, trying fallback"
            );
            fs::create_dir_all(&fallback).map_err(|e| Error::Scratch {
                reason: format!("cannot create artifacts directory: {e}"),
            })?;
            Ok(fallback)
        }
        Err(e) => Err(Error::Io(e)),
    }
}
