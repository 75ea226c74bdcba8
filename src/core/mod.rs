/*!
 * Core Types
 * Application identity and shared path conventions
 */

pub mod paths;
pub mod types;

pub use types::{ApplicationIdentity, ValidationError, ValidationResult};
