/*!
 * Cloister
 * Confined application launcher: resolves an application and its runtime,
 * composes a layered sandbox policy, provisions private directories,
 * synchronizes with a bus-filtering proxy and hands execution over to the
 * privileged sandboxing helper
 */

pub mod core;
pub mod deploy;
pub mod errors;
pub mod invocation;
pub mod keyfile;
pub mod launch;
pub mod policy;
pub mod provision;
pub mod proxy;
pub mod services;

// Re-exports
pub use crate::core::ApplicationIdentity;
pub use deploy::{Deployment, DeploymentResolver, DirResolver};
pub use errors::{LaunchError, LaunchResult};
pub use invocation::{FontDirs, Invocation, InvocationInputs};
pub use keyfile::KeyFile;
pub use launch::{LaunchRequest, DEFAULT_BUS_PROXY, DEFAULT_HELPER};
pub use policy::{BusLevel, BusScope, PolicyContext};
pub use provision::AppDirectories;
pub use proxy::{ProxyLauncher, ProxyRuleSet, ProxyState};
