/*!
 * Launch Errors
 * Aggregated error type for the whole launch sequence
 */

use crate::core::ValidationError;
use crate::deploy::DeployError;
use crate::invocation::{InvocationError, RecordError};
use crate::launch::HandoverError;
use crate::policy::PolicyError;
use crate::provision::ProvisionError;
use crate::proxy::ProxyError;
use thiserror::Error;

/// Result type for the launch pipeline
///
/// # Must Use
/// Every error aborts the run immediately; nothing below the failing step
/// executes and no rollback is attempted
#[must_use = "launch errors abort the run and must be reported"]
pub type LaunchResult<T> = Result<T, LaunchError>;

/// Unified launch error. Each variant maps to one stage of the pipeline;
/// propagation is immediate with no retry. Partial progress (provisioned
/// directories, a spawned-but-unsynced proxy) is deliberately left behind:
/// the directories are idempotently reusable and the proxy is abandoned to
/// the OS.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error(transparent)]
    Handover(#[from] HandoverError),
}
