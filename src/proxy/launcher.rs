/*!
 * Bus Proxy Launcher
 * Spawns the filtering proxy and synchronizes with it before the
 * sandboxed application may start
 */

use super::rules::{ProxyRule, ProxyRuleSet};
use log::{debug, info, warn};
use nix::unistd::pipe;
use std::io::Read;
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use thiserror::Error;

/// Result type for proxy launching
#[must_use = "an unsynchronized proxy is a confinement bypass, not a warning"]
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Proxy launch errors
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("unable to create sync pipe: {0}")]
    Pipe(#[source] nix::Error),

    #[error("unable to create proxy socket directory {path}: {source}")]
    SocketDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn bus proxy '{bin}': {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to sync with bus proxy: {0}")]
    Sync(String),
}

/// Launcher state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    Idle,
    Spawning,
    Syncing,
    Ready,
    Failed,
}

/// A running, synchronized proxy: the child handle, the retained read end
/// of the sync pipe (inherited by the helper so it can also wait on proxy
/// liveness), and the filtered socket paths.
#[derive(Debug)]
pub struct ProxyHandle {
    pub child: Child,
    pub sync_fd: OwnedFd,
    pub session_socket: Option<PathBuf>,
    pub system_socket: Option<PathBuf>,
}

/// Spawns the bus-filtering proxy and blocks until it signals readiness.
#[derive(Debug)]
pub struct ProxyLauncher {
    proxy_bin: PathBuf,
    state: ProxyState,
}

impl ProxyLauncher {
    pub fn new(proxy_bin: impl Into<PathBuf>) -> Self {
        Self {
            proxy_bin: proxy_bin.into(),
            state: ProxyState::Idle,
        }
    }

    pub fn state(&self) -> ProxyState {
        self.state
    }

    /// Launch the proxy for a non-empty rule set and wait for its
    /// readiness byte. Returns `Ok(None)` without spawning anything when
    /// the rule set is empty.
    ///
    /// The readiness read blocks with no timeout: the proxy must be
    /// listening and filtering before the sandboxed process starts, and a
    /// visible hang is preferable to racing past an unconfirmed proxy.
    /// A proxy that exits or closes its end without writing the byte is
    /// a sync failure and aborts the run; the child is abandoned, not
    /// awaited.
    pub fn launch(
        &mut self,
        sockets_dir: &Path,
        rules: &ProxyRuleSet,
    ) -> ProxyResult<Option<ProxyHandle>> {
        if rules.is_empty() {
            debug!("bus policy has no rules, skipping proxy");
            return Ok(None);
        }

        std::fs::create_dir_all(sockets_dir).map_err(|source| ProxyError::SocketDir {
            path: sockets_dir.display().to_string(),
            source,
        })?;

        let session_socket = (!rules.session.is_empty()).then(|| sockets_dir.join("session"));
        let system_socket = (!rules.system.is_empty()).then(|| sockets_dir.join("system"));

        self.state = ProxyState::Spawning;
        let (read_fd, write_fd) = pipe().map_err(ProxyError::Pipe)?;

        let mut cmd = Command::new(&self.proxy_bin);
        // The write end is plain (no CLOEXEC), so the child inherits it;
        // the proxy writes one byte there once its sockets are listening.
        cmd.arg(format!("--fd={}", write_fd.as_raw_fd()));
        if let Some(socket) = &session_socket {
            cmd.arg(session_bus_address());
            cmd.arg(socket);
            cmd.arg("--filter");
            cmd.args(rules.session.iter().filter_map(ProxyRule::arg));
        }
        if let Some(socket) = &system_socket {
            cmd.arg("--system");
            cmd.arg(system_bus_address());
            cmd.arg(socket);
            cmd.arg("--filter");
            cmd.args(rules.system.iter().filter_map(ProxyRule::arg));
        }

        let child = cmd.spawn().map_err(|source| {
            self.state = ProxyState::Failed;
            ProxyError::Spawn {
                bin: self.proxy_bin.display().to_string(),
                source,
            }
        })?;
        // Parent's copy of the write end must close now, so EOF on the
        // read end means the proxy is gone.
        drop(write_fd);

        self.state = ProxyState::Syncing;
        info!(
            "waiting for bus proxy (pid {}) to signal readiness",
            child.id()
        );
        let sync_fd = match self.wait_for_ready(read_fd) {
            Ok(fd) => fd,
            Err(e) => {
                warn!("bus proxy did not become ready: {}", e);
                return Err(e);
            }
        };

        self.state = ProxyState::Ready;
        Ok(Some(ProxyHandle {
            child,
            sync_fd,
            session_socket,
            system_socket,
        }))
    }

    fn wait_for_ready(&mut self, read_fd: OwnedFd) -> ProxyResult<OwnedFd> {
        let mut sync = std::fs::File::from(read_fd);
        let mut byte = [0u8; 1];
        loop {
            match sync.read(&mut byte) {
                Ok(1) => return Ok(sync.into()),
                Ok(_) => {
                    self.state = ProxyState::Failed;
                    return Err(ProxyError::Sync(
                        "proxy exited before signaling readiness".to_string(),
                    ));
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.state = ProxyState::Failed;
                    return Err(ProxyError::Sync(e.to_string()));
                }
            }
        }
    }
}

/// Upstream session bus address, from the environment or the conventional
/// per-user socket.
pub fn session_bus_address() -> String {
    std::env::var("DBUS_SESSION_BUS_ADDRESS").unwrap_or_else(|_| {
        format!(
            "unix:path={}",
            crate::core::paths::runtime_dir().join("bus").display()
        )
    })
}

/// Upstream system bus address, from the environment or the well-known
/// system socket.
pub fn system_bus_address() -> String {
    std::env::var("DBUS_SYSTEM_BUS_ADDRESS")
        .unwrap_or_else(|_| "unix:path=/run/dbus/system_bus_socket".to_string())
}
