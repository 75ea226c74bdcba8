/*!
 * Identity Types
 * Validated application identity and deployment reference construction
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for identity validation
///
/// # Must Use
/// Validation failures must be surfaced before any lookup happens
#[must_use = "validation failures must be handled before any lookup"]
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Identity validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum ValidationError {
    #[error("'{0}' is not a valid application name")]
    InvalidName(String),

    #[error("'{0}' is not a valid branch name")]
    InvalidBranch(String),

    #[error("'{0}' is not a valid runtime reference (expected NAME/ARCH/BRANCH)")]
    InvalidRuntimeRef(String),
}

/// Longest accepted application name, matching the deployment store's
/// path-component limits.
const MAX_NAME_LEN: usize = 255;

/// A validated application identity: reverse-DNS name, branch, architecture.
///
/// Constructed once per invocation from user input and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationIdentity {
    pub name: String,
    pub branch: String,
    pub arch: String,
}

impl ApplicationIdentity {
    /// Validate and build an identity. `branch` defaults to `master`,
    /// `arch` to the machine architecture this binary was built for.
    pub fn new(
        name: impl Into<String>,
        branch: Option<String>,
        arch: Option<String>,
    ) -> ValidationResult<Self> {
        let name = name.into();
        let branch = branch.unwrap_or_else(|| "master".to_string());

        if !is_valid_name(&name) {
            return Err(ValidationError::InvalidName(name));
        }
        if !is_valid_branch(&branch) {
            return Err(ValidationError::InvalidBranch(branch));
        }

        Ok(Self {
            name,
            branch,
            arch: arch.unwrap_or_else(|| default_arch().to_string()),
        })
    }

    /// Deployment reference for this application: `app/NAME/ARCH/BRANCH`.
    pub fn app_ref(&self) -> String {
        format!("app/{}/{}/{}", self.name, self.arch, self.branch)
    }
}

/// Architecture of the host this launcher was built for.
pub fn default_arch() -> &'static str {
    std::env::consts::ARCH
}

/// Build a runtime deployment reference from a `NAME/ARCH/BRANCH` triple
/// as found in application metadata or supplied on the command line.
pub fn runtime_ref(triple: &str) -> ValidationResult<String> {
    let parts: Vec<&str> = triple.split('/').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(ValidationError::InvalidRuntimeRef(triple.to_string()));
    }
    if !is_valid_name(parts[0]) || !is_valid_branch(parts[2]) {
        return Err(ValidationError::InvalidRuntimeRef(triple.to_string()));
    }
    Ok(format!("runtime/{}", triple))
}

/// Check the reverse-DNS application-id grammar: at least three non-empty
/// dot-separated elements, each starting with a letter or underscore and
/// continuing with letters, digits, `-` or `_`.
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }

    let elements: Vec<&str> = name.split('.').collect();
    if elements.len() < 3 {
        return false;
    }

    elements.iter().all(|element| {
        let mut chars = element.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

/// Check the branch-name grammar: non-empty, no leading `.`, characters
/// limited to letters, digits, `.`, `-` and `_`.
pub fn is_valid_branch(branch: &str) -> bool {
    if branch.is_empty() || branch.len() > MAX_NAME_LEN || branch.starts_with('.') {
        return false;
    }
    branch
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
}
