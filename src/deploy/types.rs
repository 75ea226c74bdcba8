/*!
 * Deployment Types
 * Installed application/runtime deployments and their lookup errors
 */

use crate::keyfile::{KeyFile, KeyFileError};
use crate::policy::{PolicyContext, PolicyError};
use std::path::PathBuf;
use thiserror::Error;

/// Result type for deployment resolution
///
/// # Must Use
/// An unresolved reference is fatal for the run
#[must_use = "deployment lookups can fail and must be handled"]
pub type DeployResult<T> = Result<T, DeployError>;

/// Deployment resolution errors
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("{0} is not installed")]
    NotFound(String),

    #[error("IO error reading deployment at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    KeyFile(#[from] KeyFileError),

    #[error("invalid stored policy: {0}")]
    Policy(#[from] PolicyError),
}

/// An installed, immutable deployment: a files root plus declared metadata
/// and any stored per-app policy overrides. Read-only to the launcher.
#[derive(Debug, Clone)]
pub struct Deployment {
    /// The reference this deployment was resolved from.
    pub reference: String,
    /// Root of the deployed file tree.
    pub files: PathBuf,
    /// Declared metadata.
    pub metadata: KeyFile,
    /// Stored per-app overrides, empty for runtimes.
    pub overrides: PolicyContext,
}
