//! Secrets file lookup
//!
//! The secrets document is opaque here; only its path is handed to the runner.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::error::FilesystemError;

pub const SECRETS_FILE_NAME: &str = ".bitrise.secrets.yml";

/// Candidate secrets locations under `base_dir`, highest priority first
pub fn candidates(base_dir: &Path) -> [PathBuf; 2] {
    [
        base_dir.join("e2e").join(SECRETS_FILE_NAME),
        base_dir.join(SECRETS_FILE_NAME),
    ]
}

/// Return the first existing secrets file, or `None` when there is none.
///
/// Only I/O failures other than "not found" are errors.
pub fn resolve(base_dir: &Path) -> Result<Option<PathBuf>, FilesystemError> {
    for candidate in candidates(base_dir) {
        let exists = candidate
            .try_exists()
            .map_err(|source| FilesystemError::new(&candidate, source))?;
        if exists {
            info!("Using secrets from: {}", candidate.display());
            return Ok(Some(candidate));
        }
        debug!("No secrets at {}", candidate.display());
    }

    info!("No {} found, running without secrets", SECRETS_FILE_NAME);
    Ok(None)
}
