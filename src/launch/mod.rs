/*!
 * Launch Pipeline
 * Resolves, composes, provisions, synchronizes and hands over
 */

pub mod handover;

pub use handover::{HandoverError, HandoverResult};

use crate::core::{paths, types, ApplicationIdentity};
use crate::deploy::DeploymentResolver;
use crate::errors::LaunchError;
use crate::invocation::{self, FontDirs, InvocationError, InvocationInputs};
use crate::policy::PolicyContext;
use crate::provision;
use crate::proxy::{ProxyLauncher, ProxyRuleSet};
use crate::services::SessionServices;
use log::{debug, info};
use std::convert::Infallible;
use std::os::fd::AsRawFd;
use std::path::PathBuf;

/// Default name of the privileged helper, looked up on `PATH`.
pub const DEFAULT_HELPER: &str = "cloister-helper";
/// Default name of the bus-filtering proxy, looked up on `PATH`.
pub const DEFAULT_BUS_PROXY: &str = "cloister-bus-proxy";

const SECTION_APPLICATION: &str = "Application";

/// Everything one launch needs, as gathered by the CLI surface.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub app: String,
    pub branch: Option<String>,
    pub arch: Option<String>,
    pub command: Option<String>,
    pub runtime: Option<String>,
    pub devel: bool,
    /// User-supplied policy overrides, merged last.
    pub overrides: PolicyContext,
    /// Trailing arguments, passed through verbatim.
    pub args: Vec<String>,
    pub helper: PathBuf,
    pub proxy_bin: PathBuf,
}

impl LaunchRequest {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            branch: None,
            arch: None,
            command: None,
            runtime: None,
            devel: false,
            overrides: PolicyContext::new(),
            args: Vec::new(),
            helper: PathBuf::from(DEFAULT_HELPER),
            proxy_bin: PathBuf::from(DEFAULT_BUS_PROXY),
        }
    }
}

/// Run the launch sequence. Returns only on failure: on success the
/// process image has been replaced by the helper.
pub fn run(
    request: &LaunchRequest,
    resolver: &dyn DeploymentResolver,
) -> Result<Infallible, LaunchError> {
    // Identity is validated before any lookup.
    let identity = ApplicationIdentity::new(
        request.app.clone(),
        request.branch.clone(),
        request.arch.clone(),
    )?;
    info!("launching {}", identity.app_ref());

    // The application resolves first: its metadata names the runtime.
    let app = resolver.resolve(&identity.app_ref())?;

    let runtime_triple = match &request.runtime {
        Some(triple) => triple.clone(),
        None => {
            let key = if request.devel { "sdk" } else { "runtime" };
            app.metadata
                .get(SECTION_APPLICATION, key)
                .ok_or_else(|| InvocationError::Metadata {
                    reference: app.reference.clone(),
                    section: SECTION_APPLICATION.to_string(),
                    key: key.to_string(),
                })?
                .to_string()
        }
    };
    let runtime_ref = types::runtime_ref(&runtime_triple)?;
    let runtime = resolver.resolve(&runtime_ref)?;

    // Policy composition, in increasing precedence: baseline grants,
    // runtime metadata, application metadata, stored overrides, command
    // line. The user's explicit override always wins.
    let mut policy = PolicyContext::new();
    policy.seed_baseline_grants();
    policy.load_from_metadata(&runtime.metadata)?;
    policy.load_from_metadata(&app.metadata)?;
    policy.merge(&app.overrides);
    policy.merge(&request.overrides);
    if log::log_enabled!(log::Level::Debug) {
        debug!(
            "merged policy: {}",
            serde_json::to_string(&policy).unwrap_or_else(|e| e.to_string())
        );
    }

    // The declared command must exist before anything is spawned.
    invocation::resolve_command(&app, request.command.as_deref())?;

    let dirs = provision::ensure_app_directories(&identity)?;
    let record_path = invocation::write_identity_record(&identity, &runtime_ref, &policy)?;

    // Optional collaborators; failures degrade the run, never abort it.
    let services = SessionServices::connect();
    let monitor = services.request_monitor();
    let document_mount = services.document_mount_point();
    // Scope placement must precede the proxy spawn so the proxy lands in
    // the app's group.
    services.move_to_transient_scope(&identity.name);

    let rules = ProxyRuleSet::from_policy(&policy);
    let sockets_dir = paths::runtime_dir()
        .join("cloister")
        .join(&identity.name)
        .join("bus");
    let mut proxy_launcher = ProxyLauncher::new(&request.proxy_bin);
    let proxy = proxy_launcher.launch(&sockets_dir, &rules)?;

    let fonts = FontDirs::default();
    let home = paths::home_dir();
    let invocation = invocation::build(
        &request.helper,
        resolver,
        &InvocationInputs {
            identity: &identity,
            app: &app,
            runtime: &runtime,
            policy: &policy,
            dirs: &dirs,
            record_path: &record_path,
            monitor: monitor.as_deref(),
            document_mount: document_mount.as_deref(),
            sync_fd: proxy.as_ref().map(|p| p.sync_fd.as_raw_fd()),
            session_proxy_socket: proxy.as_ref().and_then(|p| p.session_socket.as_deref()),
            system_proxy_socket: proxy.as_ref().and_then(|p| p.system_socket.as_deref()),
            command_override: request.command.as_deref(),
            devel: request.devel,
            extra_args: &request.args,
            home: home.as_deref(),
            fonts: &fonts,
        },
    )?;

    info!("handing over to {}", request.helper.display());
    Ok(handover::execute(&invocation)?)
}
