/*!
 * Cloister - Main Entry Point
 *
 * Runs an installed application inside its sandbox:
 * - resolves the app and its runtime
 * - merges declared and user-overridden sandbox policy
 * - starts the bus-filtering proxy when the policy calls for one
 * - replaces itself with the privileged sandboxing helper
 */

use clap::Parser;
use cloister::launch::{self, LaunchRequest};
use cloister::policy::{BusScope, FilesystemRule, PolicyContext, PolicyError, PolicyResult};
use cloister::{DirResolver, LaunchError};
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "cloister", version, about = "Run an application in a sandbox")]
struct Cli {
    /// Arch to use
    #[arg(long, value_name = "ARCH")]
    arch: Option<String>,

    /// Branch to use
    #[arg(long, value_name = "BRANCH")]
    branch: Option<String>,

    /// Command to run instead of the application's declared one
    #[arg(long, value_name = "COMMAND")]
    command: Option<String>,

    /// Runtime to use (NAME/ARCH/BRANCH)
    #[arg(long, value_name = "RUNTIME")]
    runtime: Option<String>,

    /// Use the development runtime (SDK) and helper development mode
    #[arg(short = 'd', long)]
    devel: bool,

    /// Share a namespace with the host (network, ipc)
    #[arg(long, value_name = "NAMESPACE")]
    share: Vec<String>,

    /// Unshare a namespace from the host
    #[arg(long, value_name = "NAMESPACE")]
    unshare: Vec<String>,

    /// Expose a device class (dri)
    #[arg(long, value_name = "DEVICE")]
    device: Vec<String>,

    /// Hide a device class
    #[arg(long, value_name = "DEVICE")]
    nodevice: Vec<String>,

    /// Expose a filesystem (host, home or an absolute path; :ro/:rw/:tmpfs)
    #[arg(long, value_name = "FILESYSTEM")]
    filesystem: Vec<String>,

    /// Set an environment variable in the sandbox
    #[arg(long, value_name = "VAR=VALUE")]
    env: Vec<String>,

    /// Unset an environment variable in the sandbox
    #[arg(long, value_name = "VAR")]
    unset_env: Vec<String>,

    /// Allow seeing a session bus name
    #[arg(long, value_name = "NAME")]
    see_name: Vec<String>,

    /// Allow talking to a session bus name
    #[arg(long, value_name = "NAME")]
    talk_name: Vec<String>,

    /// Allow owning a session bus name
    #[arg(long, value_name = "NAME")]
    own_name: Vec<String>,

    /// Revoke access to a session bus name
    #[arg(long, value_name = "NAME")]
    no_talk_name: Vec<String>,

    /// Allow seeing a system bus name
    #[arg(long, value_name = "NAME")]
    system_see_name: Vec<String>,

    /// Allow talking to a system bus name
    #[arg(long, value_name = "NAME")]
    system_talk_name: Vec<String>,

    /// Allow owning a system bus name
    #[arg(long, value_name = "NAME")]
    system_own_name: Vec<String>,

    /// Revoke access to a system bus name
    #[arg(long, value_name = "NAME")]
    system_no_talk_name: Vec<String>,

    /// Privileged sandboxing helper to hand over to
    #[arg(long, value_name = "PATH", default_value = launch::DEFAULT_HELPER)]
    helper: PathBuf,

    /// Bus-filtering proxy binary
    #[arg(long, value_name = "PATH", default_value = launch::DEFAULT_BUS_PROXY)]
    bus_proxy: PathBuf,

    /// Application to run
    #[arg(value_name = "APP")]
    app: String,

    /// Arguments passed to the application, verbatim
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl Cli {
    /// Collect the policy-override flags into a context merged last, so
    /// the user's explicit choices always win.
    fn overrides(&self) -> PolicyResult<PolicyContext> {
        use cloister::policy::BusLevel;

        let mut ctx = PolicyContext::new();
        for item in &self.share {
            ctx.set_share(item.parse()?, true);
        }
        for item in &self.unshare {
            ctx.set_share(item.parse()?, false);
        }
        for item in &self.device {
            ctx.set_device(item.parse()?, true);
        }
        for item in &self.nodevice {
            ctx.set_device(item.parse()?, false);
        }
        for item in &self.filesystem {
            ctx.add_filesystem(FilesystemRule::parse(item)?);
        }
        for item in &self.env {
            let (name, value) = item
                .split_once('=')
                .ok_or_else(|| PolicyError::parse("environment override", item.clone()))?;
            ctx.set_env(name, value);
        }
        for name in &self.unset_env {
            ctx.unset_env(name);
        }

        let session = [
            (&self.see_name, BusLevel::See),
            (&self.talk_name, BusLevel::Talk),
            (&self.own_name, BusLevel::Own),
            (&self.no_talk_name, BusLevel::None),
        ];
        for (names, level) in session {
            for name in names {
                ctx.set_bus_policy(BusScope::Session, name, level);
            }
        }
        let system = [
            (&self.system_see_name, BusLevel::See),
            (&self.system_talk_name, BusLevel::Talk),
            (&self.system_own_name, BusLevel::Own),
            (&self.system_no_talk_name, BusLevel::None),
        ];
        for (names, level) in system {
            for name in names {
                ctx.set_bus_policy(BusScope::System, name, level);
            }
        }
        Ok(ctx)
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let overrides = match cli.overrides() {
        Ok(overrides) => overrides,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let request = LaunchRequest {
        app: cli.app,
        branch: cli.branch,
        arch: cli.arch,
        command: cli.command,
        runtime: cli.runtime,
        devel: cli.devel,
        overrides,
        args: cli.args,
        helper: cli.helper,
        proxy_bin: cli.bus_proxy,
    };

    let resolver = DirResolver::with_default_locations();
    // On success the process image is replaced and this never returns.
    let err: LaunchError = match launch::run(&request, &resolver) {
        Ok(never) => match never {},
        Err(e) => e,
    };

    error!("launch failed: {}", err);
    eprintln!("error: {}", err);
    ExitCode::FAILURE
}
