/*!
 * Process Handover
 * Irreversible replacement of this process with the privileged helper
 */

use crate::invocation::Invocation;
use nix::unistd::execvpe;
use std::convert::Infallible;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use thiserror::Error;

/// Result type for the handover: the success case never materializes.
#[must_use = "a failed handover is the run's final error"]
pub type HandoverResult = Result<Infallible, HandoverError>;

/// Handover errors
#[derive(Error, Debug)]
pub enum HandoverError {
    #[error("argument or environment entry contains a NUL byte")]
    BadArgument,

    #[error("unable to start app: {0}")]
    Exec(#[source] nix::Error),
}

/// Replace the current process image with the helper. On success control
/// never returns here; everything that must survive into the sandbox
/// (directories, identity record, inherited descriptors) is already in its
/// final state. Write ends of synchronization pipes were closed at spawn
/// time, so nothing unintended is inherited.
pub fn execute(invocation: &Invocation) -> HandoverResult {
    let argv: Vec<CString> = invocation
        .argv
        .iter()
        .map(|arg| CString::new(arg.as_bytes()))
        .collect::<Result<_, _>>()
        .map_err(|_| HandoverError::BadArgument)?;

    let envp: Vec<CString> = invocation
        .env
        .iter()
        .map(|(name, value)| {
            let mut entry = name.as_bytes().to_vec();
            entry.push(b'=');
            entry.extend_from_slice(value.as_bytes());
            CString::new(entry)
        })
        .collect::<Result<_, _>>()
        .map_err(|_| HandoverError::BadArgument)?;

    let program = argv.first().ok_or(HandoverError::BadArgument)?;
    let never = execvpe(program, &argv, &envp).map_err(HandoverError::Exec)?;
    match never {}
}
