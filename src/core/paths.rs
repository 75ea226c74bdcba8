/*!
 * Path Conventions
 * Per-user directory locations shared across the launcher
 */

use nix::unistd::getuid;
use std::path::PathBuf;

/// The user's home directory, falling back to `$HOME` when the platform
/// lookup fails.
pub fn home_dir() -> Option<PathBuf> {
    dirs::home_dir().or_else(|| std::env::var_os("HOME").map(PathBuf::from))
}

/// The per-user runtime directory (`$XDG_RUNTIME_DIR`, conventionally
/// `/run/user/<uid>`).
pub fn runtime_dir() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(format!("/run/user/{}", getuid().as_raw())))
}

/// Fixed location inside the sandbox's runtime dir where the helper looks
/// for the identity record.
pub fn sandbox_info_target() -> String {
    format!("/run/user/{}/app-info", getuid().as_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_target_is_uid_keyed() {
        let target = sandbox_info_target();
        assert!(target.starts_with("/run/user/"));
        assert!(target.ends_with("/app-info"));
    }
}
