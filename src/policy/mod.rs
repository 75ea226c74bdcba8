/*!
 * Sandbox Policy
 * Permission model and deterministic multi-source composition
 */

pub mod context;
pub mod types;

pub use context::{PolicyContext, DESKTOP_PORTAL_NAME, DOCUMENTS_PORTAL_NAME};
pub use types::{
    BusLevel, BusScope, DeviceClass, FilesystemMode, FilesystemRule, FilesystemSource,
    NamespaceShare, PolicyError, PolicyResult,
};
