/*!
 * Session Services
 * Best-effort calls to optional session-bus collaborators: the monitor
 * helper, the document portal and the systemd user manager
 *
 * Every call here degrades silently: a missing service, an error reply or
 * a timeout produces `None`/no-op, never a launch failure.
 */

use log::{debug, warn};
use std::os::unix::ffi::OsStringExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::time::timeout;
use zbus::zvariant::Value;
use zbus::Connection;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const MONITOR_TIMEOUT: Duration = Duration::from_secs(5);
const SCOPE_TIMEOUT: Duration = Duration::from_secs(5);
/// Fixed upper bound on the document mount-point query.
const DOCUMENT_TIMEOUT: Duration = Duration::from_secs(30);

const SESSION_HELPER_NAME: &str = "org.freedesktop.Cloister";
const SESSION_HELPER_PATH: &str = "/org/freedesktop/Cloister/SessionHelper";
const SESSION_HELPER_IFACE: &str = "org.freedesktop.Cloister.SessionHelper";

const DOCUMENTS_PATH: &str = "/org/freedesktop/portal/documents";

const SYSTEMD_NAME: &str = "org.freedesktop.systemd1";
const SYSTEMD_PATH: &str = "/org/freedesktop/systemd1";
const SYSTEMD_MANAGER_IFACE: &str = "org.freedesktop.systemd1.Manager";

struct Inner {
    rt: Runtime,
    conn: Connection,
}

/// Holder for the optional session-bus connection. Construction never
/// fails: without a session bus every query simply returns nothing.
pub struct SessionServices {
    inner: Option<Inner>,
}

impl SessionServices {
    /// Connect to the session bus, best-effort.
    pub fn connect() -> Self {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                warn!("cannot set up runtime for session services: {}", e);
                return Self { inner: None };
            }
        };

        let conn = rt.block_on(async { timeout(CONNECT_TIMEOUT, Connection::session()).await });
        match conn {
            Ok(Ok(conn)) => Self {
                inner: Some(Inner { rt, conn }),
            },
            Ok(Err(e)) => {
                debug!("no session bus: {}", e);
                Self { inner: None }
            }
            Err(_) => {
                debug!("session bus connection timed out");
                Self { inner: None }
            }
        }
    }

    /// Ask the session helper for the path of a live monitor socket.
    pub fn request_monitor(&self) -> Option<PathBuf> {
        let inner = self.inner.as_ref()?;
        let reply = inner.rt.block_on(async {
            timeout(
                MONITOR_TIMEOUT,
                inner.conn.call_method(
                    Some(SESSION_HELPER_NAME),
                    SESSION_HELPER_PATH,
                    Some(SESSION_HELPER_IFACE),
                    "RequestMonitor",
                    &(),
                ),
            )
            .await
        });

        match reply {
            Ok(Ok(message)) => match message.body().deserialize::<String>() {
                Ok(path) if !path.is_empty() => Some(PathBuf::from(path)),
                Ok(_) => None,
                Err(e) => {
                    debug!("unexpected monitor reply: {}", e);
                    None
                }
            },
            Ok(Err(e)) => {
                debug!("no monitor available: {}", e);
                None
            }
            Err(_) => {
                debug!("monitor request timed out");
                None
            }
        }
    }

    /// Ask the document portal where its shared tree is mounted.
    pub fn document_mount_point(&self) -> Option<PathBuf> {
        let inner = self.inner.as_ref()?;
        let reply = inner.rt.block_on(async {
            timeout(
                DOCUMENT_TIMEOUT,
                inner.conn.call_method(
                    Some(crate::policy::DOCUMENTS_PORTAL_NAME),
                    DOCUMENTS_PATH,
                    Some(crate::policy::DOCUMENTS_PORTAL_NAME),
                    "GetMountPoint",
                    &(),
                ),
            )
            .await
        });

        match reply {
            Ok(Ok(message)) => match message.body().deserialize::<Vec<u8>>() {
                Ok(mut bytes) => {
                    // The portal returns a NUL-terminated byte string.
                    if bytes.last() == Some(&0) {
                        bytes.pop();
                    }
                    if bytes.is_empty() {
                        None
                    } else {
                        Some(PathBuf::from(std::ffi::OsString::from_vec(bytes)))
                    }
                }
                Err(e) => {
                    debug!("unexpected document portal reply: {}", e);
                    None
                }
            },
            Ok(Err(e)) => {
                warn!("can't get document portal mount point: {}", e);
                None
            }
            Err(_) => {
                warn!("document portal query timed out");
                None
            }
        }
    }

    /// Move this process into its own transient scope, so the proxy and
    /// the sandboxed app end up grouped under one unit. Must run before
    /// the proxy spawns.
    pub fn move_to_transient_scope(&self, app_id: &str) {
        let Some(inner) = self.inner.as_ref() else {
            return;
        };

        let unit = format!("cloister-{}-{}.scope", app_id, std::process::id());
        let properties: Vec<(&str, Value<'_>)> =
            vec![("PIDs", Value::new(vec![std::process::id()]))];
        let aux: Vec<(&str, Vec<(&str, Value<'_>)>)> = Vec::new();

        let reply = inner.rt.block_on(async {
            timeout(
                SCOPE_TIMEOUT,
                inner.conn.call_method(
                    Some(SYSTEMD_NAME),
                    SYSTEMD_PATH,
                    Some(SYSTEMD_MANAGER_IFACE),
                    "StartTransientUnit",
                    &(unit.as_str(), "fail", properties, aux),
                ),
            )
            .await
        });

        match reply {
            Ok(Ok(_)) => debug!("running in transient scope {}", unit),
            Ok(Err(e)) => debug!("transient scope not created: {}", e),
            Err(_) => debug!("transient scope request timed out"),
        }
    }
}
