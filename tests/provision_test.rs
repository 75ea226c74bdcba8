/*!
 * Provisioner Tests
 * Private per-app directory creation
 */

use cloister::provision::{ensure_app_directories_in, ProvisionError};
use cloister::ApplicationIdentity;
use pretty_assertions::assert_eq;
use std::os::unix::fs::PermissionsExt;

fn identity(name: &str) -> ApplicationIdentity {
    ApplicationIdentity::new(name, None, None).unwrap()
}

#[test]
fn test_idempotent_same_paths_no_error() {
    let base = tempfile::tempdir().unwrap();
    let id = identity("org.example.App");

    let first = ensure_app_directories_in(base.path(), &id).unwrap();
    let second = ensure_app_directories_in(base.path(), &id).unwrap();

    assert_eq!(first, second);
    assert!(first.cache.is_dir());
    assert!(first.data.is_dir());
    assert!(first.config.is_dir());
}

#[test]
fn test_keyed_by_application_name() {
    let base = tempfile::tempdir().unwrap();
    let a = ensure_app_directories_in(base.path(), &identity("org.example.One")).unwrap();
    let b = ensure_app_directories_in(base.path(), &identity("org.example.Two")).unwrap();
    assert_ne!(a.data, b.data);
    assert!(a.data.ends_with("org.example.One/data"));
}

#[test]
fn test_owner_only_permissions() {
    let base = tempfile::tempdir().unwrap();
    let dirs = ensure_app_directories_in(base.path(), &identity("org.example.App")).unwrap();
    for dir in [&dirs.cache, &dirs.data, &dirs.config] {
        let mode = dir.metadata().unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700, "unexpected mode on {}", dir.display());
    }
}

#[test]
fn test_creation_failure_is_fatal() {
    let base = tempfile::tempdir().unwrap();
    // A file where the app dir should go forces the failure path.
    let obstruction = base.path().join("org.example.App");
    std::fs::write(&obstruction, b"in the way").unwrap();

    let err = ensure_app_directories_in(base.path(), &identity("org.example.App")).unwrap_err();
    assert!(matches!(err, ProvisionError::Create { .. }));
}
