/*!
 * Identity Record
 * Transient file conveying merged policy and identity to the helper and
 * anything it execs
 */

use crate::core::paths;
use crate::core::ApplicationIdentity;
use crate::keyfile::KeyFile;
use crate::policy::PolicyContext;
use log::debug;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for identity-record writing
#[must_use = "a missing identity record leaves the sandbox unidentifiable"]
pub type RecordResult<T> = Result<T, RecordError>;

/// Identity record errors
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("failed to write identity record in {dir}: {source}")]
    Write {
        dir: String,
        #[source]
        source: std::io::Error,
    },
}

/// Write the identity record into the per-user runtime directory and
/// return its uniquely-named path. The file is deliberately left behind:
/// the helper and the sandboxed process read it, and session cleanup
/// removes it after the app exits.
pub fn write_identity_record(
    identity: &ApplicationIdentity,
    runtime_ref: &str,
    policy: &PolicyContext,
) -> RecordResult<PathBuf> {
    let dir = paths::runtime_dir().join("cloister");
    write_identity_record_in(&dir, identity, runtime_ref, policy)
}

/// Like [`write_identity_record`] with an explicit directory.
pub fn write_identity_record_in(
    dir: &Path,
    identity: &ApplicationIdentity,
    runtime_ref: &str,
    policy: &PolicyContext,
) -> RecordResult<PathBuf> {
    let to_err = |source: std::io::Error| RecordError::Write {
        dir: dir.display().to_string(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(to_err)?;

    let mut keyfile = KeyFile::new();
    keyfile.set("Application", "name", &identity.name);
    keyfile.set("Application", "runtime", runtime_ref);
    policy.save_to_keyfile(&mut keyfile);

    let mut file = tempfile::Builder::new()
        .prefix("app-context-")
        .tempfile_in(dir)
        .map_err(to_err)?;
    file.write_all(keyfile.to_string().as_bytes())
        .map_err(to_err)?;
    let (_, path) = file.keep().map_err(|e| to_err(e.error))?;

    debug!("identity record written to {}", path.display());
    Ok(path)
}
