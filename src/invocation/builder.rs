/*!
 * Invocation Builder
 * Assembles the privileged helper's argument vector and environment
 *
 * The helper consumes flags and positionals strictly in order, and bind
 * flags are applied in the given order with later bindings shadowing
 * earlier ones at the same sandbox path, so the emission order below is
 * part of the security contract:
 *
 *   1. extension binds (application's, then runtime's)
 *   2. identity-record injection
 *   3. private cache/data/config binds
 *   4. monitor bind or read-only resolv fallback
 *   5. policy translation (filesystems, devices, namespaces, doc mount)
 *   6. host and user font binds
 *   7. proxy sync descriptor
 *   8. app files root, app id, runtime files root
 *   9. command and trailing arguments, verbatim
 */

use super::env::build_env;
use crate::core::paths;
use crate::core::types::is_valid_name;
use crate::core::ApplicationIdentity;
use crate::deploy::{DeployError, Deployment, DeploymentResolver};
use crate::keyfile::KeyFile;
use crate::policy::{
    DeviceClass, FilesystemMode, FilesystemSource, NamespaceShare, PolicyContext,
};
use crate::provision::AppDirectories;
use log::{debug, warn};
use nix::unistd::getuid;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Helper argument grammar. Flags taking a value consume the next argument.
const FLAG_LOCK_RUNTIME: &str = "-l";
const FLAG_RO_BIND: &str = "-b"; // DEST=SRC
const FLAG_RW_BIND: &str = "-B"; // DEST=SRC
const FLAG_TMPFS: &str = "-T"; // DEST
const FLAG_INFO_FILE: &str = "-M"; // DEST=SRC
const FLAG_MONITOR: &str = "-m"; // PATH
const FLAG_RO_RESOLV: &str = "-r";
const FLAG_SHARE_NETWORK: &str = "-n";
const FLAG_SHARE_IPC: &str = "-i";
const FLAG_EXPOSE_GPU: &str = "-g";
const FLAG_DEVEL: &str = "-c";
const FLAG_SYNC_FD: &str = "-S"; // FD
const FLAG_APP_PATH: &str = "-a"; // PATH
const FLAG_APP_ID: &str = "-I"; // ID

const SYSTEM_FONTS_DIR: &str = "/usr/share/fonts";
const SECTION_APPLICATION: &str = "Application";
const EXTENSION_SECTION_PREFIX: &str = "Extension ";

/// Result type for invocation building
#[must_use = "a failed invocation build must abort the launch"]
pub type InvocationResult<T> = Result<T, InvocationError>;

/// Invocation build errors
#[derive(Error, Debug)]
pub enum InvocationError {
    #[error("{reference} declares no '{key}' in its '{section}' metadata")]
    Metadata {
        reference: String,
        section: String,
        key: String,
    },

    #[error("invalid extension declaration '{name}' in {reference}")]
    Extension { reference: String, name: String },

    #[error(transparent)]
    Deploy(#[from] DeployError),
}

/// Font directory conventions, injectable so tests can point at their own
/// tree.
#[derive(Debug, Clone)]
pub struct FontDirs {
    pub system: PathBuf,
    pub user_candidates: Vec<PathBuf>,
}

impl Default for FontDirs {
    fn default() -> Self {
        let user_candidates = paths::home_dir()
            .map(|home| vec![home.join(".local/share/fonts"), home.join(".fonts")])
            .unwrap_or_default();
        Self {
            system: PathBuf::from(SYSTEM_FONTS_DIR),
            user_candidates,
        }
    }
}

/// Everything the builder consumes. All referenced state is read-only.
pub struct InvocationInputs<'a> {
    pub identity: &'a ApplicationIdentity,
    pub app: &'a Deployment,
    pub runtime: &'a Deployment,
    pub policy: &'a PolicyContext,
    pub dirs: &'a AppDirectories,
    pub record_path: &'a Path,
    pub monitor: Option<&'a Path>,
    pub document_mount: Option<&'a Path>,
    pub sync_fd: Option<RawFd>,
    pub session_proxy_socket: Option<&'a Path>,
    pub system_proxy_socket: Option<&'a Path>,
    pub command_override: Option<&'a str>,
    pub devel: bool,
    pub extra_args: &'a [String],
    pub home: Option<&'a Path>,
    pub fonts: &'a FontDirs,
}

/// The final helper invocation: ordered argument vector plus environment.
#[derive(Debug)]
pub struct Invocation {
    pub argv: Vec<OsString>,
    pub env: BTreeMap<OsString, OsString>,
}

/// Resolve the command to run: the explicit override, else the
/// application's declared default command.
pub fn resolve_command<'a>(
    app: &'a Deployment,
    command_override: Option<&'a str>,
) -> InvocationResult<&'a str> {
    match command_override {
        Some(command) => Ok(command),
        None => app
            .metadata
            .get(SECTION_APPLICATION, "command")
            .ok_or_else(|| InvocationError::Metadata {
                reference: app.reference.clone(),
                section: SECTION_APPLICATION.to_string(),
                key: "command".to_string(),
            }),
    }
}

/// Build the helper argv and environment.
pub fn build(
    helper: &Path,
    resolver: &dyn DeploymentResolver,
    inputs: &InvocationInputs<'_>,
) -> InvocationResult<Invocation> {
    // Required metadata is checked before any argument is emitted.
    let command = resolve_command(inputs.app, inputs.command_override)?;

    let mut argv: Vec<OsString> = vec![helper.into(), FLAG_LOCK_RUNTIME.into()];

    // 1. Extension content, application's first so runtime extensions of
    //    the same name cannot shadow it.
    push_extension_args(&mut argv, resolver, inputs.app)?;
    push_extension_args(&mut argv, resolver, inputs.runtime)?;

    // 2. Identity record, at a destination the helper derives from the
    //    invoking uid alone.
    argv.push(FLAG_INFO_FILE.into());
    argv.push(bind_value(
        Path::new(&paths::sandbox_info_target()),
        inputs.record_path,
    ));

    // 3. Private per-app directories.
    for (target, source) in [
        ("/var/cache", &inputs.dirs.cache),
        ("/var/data", &inputs.dirs.data),
        ("/var/config", &inputs.dirs.config),
    ] {
        argv.push(FLAG_RW_BIND.into());
        argv.push(bind_value(Path::new(target), source));
    }

    // 4. Live monitor when available, read-only resolv fallback otherwise.
    match inputs.monitor {
        Some(monitor) => {
            argv.push(FLAG_MONITOR.into());
            argv.push(monitor.into());
        }
        None => argv.push(FLAG_RO_RESOLV.into()),
    }

    // 5. Policy translation.
    push_filesystem_args(&mut argv, inputs.policy, inputs.home);
    if inputs.policy.allows_device(DeviceClass::Gpu) {
        argv.push(FLAG_EXPOSE_GPU.into());
    }
    if inputs.policy.shares(NamespaceShare::Network) {
        argv.push(FLAG_SHARE_NETWORK.into());
    }
    if inputs.policy.shares(NamespaceShare::Ipc) {
        argv.push(FLAG_SHARE_IPC.into());
    }
    if let Some(mount) = inputs.document_mount {
        argv.push(FLAG_RO_BIND.into());
        let target = format!("/run/user/{}/doc", getuid().as_raw());
        argv.push(bind_value(Path::new(&target), mount));
    }
    if inputs.devel {
        argv.push(FLAG_DEVEL.into());
    }

    // 6. Fonts: the host set always, the user set when one of the two
    //    conventional locations exists (first match wins).
    argv.push(FLAG_RO_BIND.into());
    argv.push(bind_value(Path::new("/run/host/fonts"), &inputs.fonts.system));
    if let Some(user_fonts) = inputs
        .fonts
        .user_candidates
        .iter()
        .find(|dir| dir.is_dir())
    {
        argv.push(FLAG_RO_BIND.into());
        argv.push(bind_value(Path::new("/run/host/user-fonts"), user_fonts));
    }

    // 7. Proxy liveness descriptor.
    if let Some(fd) = inputs.sync_fd {
        argv.push(FLAG_SYNC_FD.into());
        argv.push(fd.to_string().into());
    }

    // 8. Fixed positionals.
    argv.push(FLAG_APP_PATH.into());
    argv.push(inputs.app.files.as_os_str().to_os_string());
    argv.push(FLAG_APP_ID.into());
    argv.push(inputs.identity.name.clone().into());
    argv.push(inputs.runtime.files.as_os_str().to_os_string());

    // 9. Command and trailing arguments, verbatim and uninterpreted.
    argv.push(command.into());
    argv.extend(inputs.extra_args.iter().map(OsString::from));

    let env = build_env(
        std::env::vars_os(),
        inputs.policy,
        &inputs.identity.name,
        inputs.session_proxy_socket,
        inputs.system_proxy_socket,
    );

    debug!("helper invocation has {} arguments", argv.len());
    Ok(Invocation { argv, env })
}

fn bind_value(target: &Path, source: &Path) -> OsString {
    let mut value = OsString::from(target);
    value.push("=");
    value.push(source);
    value
}

fn push_filesystem_args(argv: &mut Vec<OsString>, policy: &PolicyContext, home: Option<&Path>) {
    for rule in policy.filesystems() {
        let (target, source) = match &rule.source {
            FilesystemSource::Host => (PathBuf::from("/run/host"), PathBuf::from("/")),
            FilesystemSource::Home => match home {
                Some(home) => (home.to_path_buf(), home.to_path_buf()),
                None => {
                    warn!("no home directory, skipping home filesystem rule");
                    continue;
                }
            },
            FilesystemSource::Path(path) => (path.clone(), path.clone()),
        };
        match rule.mode {
            FilesystemMode::ReadOnly => {
                argv.push(FLAG_RO_BIND.into());
                argv.push(bind_value(&target, &source));
            }
            FilesystemMode::ReadWrite => {
                argv.push(FLAG_RW_BIND.into());
                argv.push(bind_value(&target, &source));
            }
            FilesystemMode::Tmpfs => {
                argv.push(FLAG_TMPFS.into());
                argv.push(target.into());
            }
        }
    }
}

/// Emit bind arguments for every extension a deployment's metadata
/// declares. Extensions are extra deployed trees mounted into the owner's
/// prefix (`/app` for applications, `/usr` for runtimes); ones that are
/// not installed are skipped.
fn push_extension_args(
    argv: &mut Vec<OsString>,
    resolver: &dyn DeploymentResolver,
    owner: &Deployment,
) -> InvocationResult<()> {
    let parts: Vec<&str> = owner.reference.split('/').collect();
    if parts.len() != 4 {
        return Ok(());
    }
    let (kind, arch, branch) = (parts[0], parts[2], parts[3]);
    let prefix = if kind == "app" { "/app" } else { "/usr" };

    for section in extension_sections(&owner.metadata) {
        let name = &section[EXTENSION_SECTION_PREFIX.len()..];
        if !is_valid_name(name) {
            return Err(InvocationError::Extension {
                reference: owner.reference.clone(),
                name: name.to_string(),
            });
        }
        let directory = owner.metadata.get(&section, "directory").ok_or_else(|| {
            InvocationError::Metadata {
                reference: owner.reference.clone(),
                section: section.clone(),
                key: "directory".to_string(),
            }
        })?;
        let version = owner.metadata.get(&section, "version").unwrap_or(branch);

        let ext_ref = format!("runtime/{}/{}/{}", name, arch, version);
        match resolver.resolve(&ext_ref) {
            Ok(extension) => {
                argv.push(FLAG_RO_BIND.into());
                let target = Path::new(prefix).join(directory);
                argv.push(bind_value(&target, &extension.files));
            }
            Err(DeployError::NotFound(_)) => {
                debug!("extension {} not installed, skipping", ext_ref);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn extension_sections(metadata: &KeyFile) -> Vec<String> {
    metadata
        .sections()
        .filter(|s| s.starts_with(EXTENSION_SECTION_PREFIX))
        .map(str::to_string)
        .collect()
}
