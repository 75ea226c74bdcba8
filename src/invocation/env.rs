/*!
 * Sandbox Environment
 * Final environment mapping handed to the privileged helper
 */

use crate::policy::PolicyContext;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::Path;

/// Variable naming the application id inside the sandbox.
pub const APP_ID_VAR: &str = "CLOISTER_APP_ID";

/// Variables never forwarded into the sandbox: loader injection vectors
/// and host search paths that would leak host layout into the sandbox.
const DONT_EXPORT: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    "GST_PLUGIN_PATH",
    "GST_REGISTRY",
    "PYTHONPATH",
    "PERLLIB",
    "PERL5LIB",
    "XCURSOR_PATH",
    "XDG_CONFIG_DIRS",
    "XDG_DATA_DIRS",
    "XDG_CACHE_HOME",
    "XDG_CONFIG_HOME",
    "XDG_DATA_HOME",
    "TMPDIR",
];

/// Fixed sandbox-side defaults, applied after stripping.
const DEFAULTS: &[(&str, &str)] = &[
    ("PATH", "/app/bin:/usr/bin"),
    ("SHELL", "/bin/sh"),
    ("LD_LIBRARY_PATH", "/app/lib"),
    ("XDG_CONFIG_DIRS", "/app/etc/xdg:/etc/xdg"),
    ("XDG_DATA_DIRS", "/app/share:/usr/share"),
    // The private per-app directories as seen from inside the sandbox.
    ("XDG_CACHE_HOME", "/var/cache"),
    ("XDG_DATA_HOME", "/var/data"),
    ("XDG_CONFIG_HOME", "/var/config"),
];

/// Build the helper's environment from the current process environment:
/// strip dangerous variables, apply sandbox defaults, apply the policy's
/// environment overrides, point bus addresses at the filtered sockets and
/// inject the application id.
pub fn build_env(
    base: impl Iterator<Item = (OsString, OsString)>,
    policy: &PolicyContext,
    app_id: &str,
    session_proxy_socket: Option<&Path>,
    system_proxy_socket: Option<&Path>,
) -> BTreeMap<OsString, OsString> {
    let mut env: BTreeMap<OsString, OsString> = base.collect();

    for name in DONT_EXPORT {
        env.remove(OsStr::new(name));
    }
    for (name, value) in DEFAULTS {
        env.insert(name.into(), value.into());
    }

    // Policy overrides win over the defaults; the end user asked for them.
    for (name, value) in policy.env_overrides() {
        match value {
            Some(value) => {
                env.insert(name.into(), value.into());
            }
            None => {
                env.remove(OsStr::new(name.as_str()));
            }
        }
    }

    // Bus addresses are forced last: when filtering is active the sandbox
    // must only ever see the proxied socket.
    if let Some(socket) = session_proxy_socket {
        env.insert(
            "DBUS_SESSION_BUS_ADDRESS".into(),
            format!("unix:path={}", socket.display()).into(),
        );
    }
    if let Some(socket) = system_proxy_socket {
        env.insert(
            "DBUS_SYSTEM_BUS_ADDRESS".into(),
            format!("unix:path={}", socket.display()).into(),
        );
    }

    env.insert(APP_ID_VAR.into(), app_id.into());
    env
}
