/*!
 * Helper Invocation
 * Argument vector, environment and identity record for the privileged
 * sandboxing helper
 */

pub mod builder;
pub mod env;
pub mod record;

pub use builder::{
    build, resolve_command, FontDirs, Invocation, InvocationError, InvocationInputs,
    InvocationResult,
};
pub use env::APP_ID_VAR;
pub use record::{write_identity_record, write_identity_record_in, RecordError, RecordResult};
