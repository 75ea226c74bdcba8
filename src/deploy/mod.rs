/*!
 * Deployments
 * Resolution of installed application and runtime deployments
 */

pub mod resolver;
pub mod types;

pub use resolver::{DeploymentResolver, DirResolver};
pub use types::{DeployError, DeployResult, Deployment};
