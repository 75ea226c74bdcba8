/*!
 * Directory Provisioner
 * Private per-application cache/data/config directories
 */

use crate::core::paths;
use crate::core::ApplicationIdentity;
use log::debug;
use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for directory provisioning
#[must_use = "provisioning failures are fatal for the run"]
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Provisioning errors
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("cannot determine the user home directory")]
    NoHome,

    #[error("failed to create {path}: {source}")]
    Create {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// The three private directories provisioned for one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDirectories {
    pub cache: PathBuf,
    pub data: PathBuf,
    pub config: PathBuf,
}

/// Ensure the private directory tree for an application under the
/// conventional per-user base (`~/.var/app/<name>`). Idempotent: repeated
/// calls return the same paths without error.
pub fn ensure_app_directories(identity: &ApplicationIdentity) -> ProvisionResult<AppDirectories> {
    let home = paths::home_dir().ok_or(ProvisionError::NoHome)?;
    ensure_app_directories_in(&home.join(".var/app"), identity)
}

/// Like [`ensure_app_directories`] with an explicit base directory.
pub fn ensure_app_directories_in(
    base: &Path,
    identity: &ApplicationIdentity,
) -> ProvisionResult<AppDirectories> {
    let app_dir = base.join(&identity.name);
    let dirs = AppDirectories {
        cache: app_dir.join("cache"),
        data: app_dir.join("data"),
        config: app_dir.join("config"),
    };

    // Owner-only on every component from the app dir down; the base may
    // pre-exist with looser modes.
    create_private_dir(&app_dir)?;
    for dir in [&dirs.cache, &dirs.data, &dirs.config] {
        create_private_dir(dir)?;
    }

    debug!("provisioned app directories under {}", app_dir.display());
    Ok(dirs)
}

fn create_private_dir(path: &Path) -> ProvisionResult<()> {
    match DirBuilder::new().recursive(true).mode(0o700).create(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(source) => Err(ProvisionError::Create {
            path: path.display().to_string(),
            source,
        }),
    }
}
