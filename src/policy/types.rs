/*!
 * Policy Types
 * Value types for sandbox permissions: bus access levels, filesystem
 * exposure rules, device classes and namespace sharing
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Result type for policy parsing and composition
///
/// # Must Use
/// A parse failure must abort the run: no policy value is ever silently
/// widened by ignoring it
#[must_use = "policy errors fail the launch closed and must be handled"]
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Policy errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("malformed {what} value '{value}'")]
    Parse { what: &'static str, value: String },
}

impl PolicyError {
    pub fn parse(what: &'static str, value: impl Into<String>) -> Self {
        Self::Parse {
            what,
            value: value.into(),
        }
    }
}

/// Access level for one named bus service. Totally ordered:
/// `None < See < Talk < Own`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BusLevel {
    None,
    See,
    Talk,
    Own,
}

impl BusLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            BusLevel::None => "none",
            BusLevel::See => "see",
            BusLevel::Talk => "talk",
            BusLevel::Own => "own",
        }
    }
}

impl FromStr for BusLevel {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(BusLevel::None),
            "see" => Ok(BusLevel::See),
            "talk" => Ok(BusLevel::Talk),
            "own" => Ok(BusLevel::Own),
            other => Err(PolicyError::parse("bus access level", other)),
        }
    }
}

impl fmt::Display for BusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which message bus a policy entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusScope {
    Session,
    System,
}

/// Exposure mode of one filesystem rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilesystemMode {
    ReadOnly,
    ReadWrite,
    Tmpfs,
}

impl FilesystemMode {
    pub fn suffix(self) -> &'static str {
        match self {
            FilesystemMode::ReadOnly => "ro",
            FilesystemMode::ReadWrite => "rw",
            FilesystemMode::Tmpfs => "tmpfs",
        }
    }
}

/// What a filesystem rule exposes: the whole host filesystem, the user's
/// home directory, or one host path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source", content = "path")]
pub enum FilesystemSource {
    Host,
    Home,
    Path(PathBuf),
}

impl FilesystemSource {
    /// Stable token used as the merge key and serialized form.
    pub fn token(&self) -> String {
        match self {
            FilesystemSource::Host => "host".to_string(),
            FilesystemSource::Home => "home".to_string(),
            FilesystemSource::Path(p) => p.display().to_string(),
        }
    }
}

/// One ordered filesystem exposure rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemRule {
    pub source: FilesystemSource,
    pub mode: FilesystemMode,
}

impl FilesystemRule {
    pub fn new(source: FilesystemSource, mode: FilesystemMode) -> Self {
        Self { source, mode }
    }

    /// Parse the `TOKEN[:MODE]` grammar: `host`, `home` or an absolute
    /// path, optionally suffixed with `:ro`, `:rw` or `:tmpfs`. The mode
    /// defaults to read-write. Any other suffix fails closed.
    pub fn parse(value: &str) -> PolicyResult<Self> {
        let (token, mode) = match value.rsplit_once(':') {
            Some((token, "ro")) => (token, FilesystemMode::ReadOnly),
            Some((token, "rw")) => (token, FilesystemMode::ReadWrite),
            Some((token, "tmpfs")) => (token, FilesystemMode::Tmpfs),
            Some(_) => return Err(PolicyError::parse("filesystem rule", value)),
            None => (value, FilesystemMode::ReadWrite),
        };

        let source = match token {
            "host" => FilesystemSource::Host,
            "home" | "~" => FilesystemSource::Home,
            path if path.starts_with('/') => FilesystemSource::Path(PathBuf::from(path)),
            _ => return Err(PolicyError::parse("filesystem rule", value)),
        };

        Ok(Self::new(source, mode))
    }

    /// Serialized `TOKEN[:MODE]` form, omitting the default `rw` suffix.
    pub fn render(&self) -> String {
        match self.mode {
            FilesystemMode::ReadWrite => self.source.token(),
            mode => format!("{}:{}", self.source.token(), mode.suffix()),
        }
    }
}

/// Device categories that can be exposed to the sandbox.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    /// GPU device nodes (`/dev/dri`)
    Gpu,
}

impl DeviceClass {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceClass::Gpu => "dri",
        }
    }
}

impl FromStr for DeviceClass {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dri" => Ok(DeviceClass::Gpu),
            other => Err(PolicyError::parse("device class", other)),
        }
    }
}

/// Host namespaces the sandbox may share.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceShare {
    Network,
    Ipc,
}

impl NamespaceShare {
    pub fn as_str(self) -> &'static str {
        match self {
            NamespaceShare::Network => "network",
            NamespaceShare::Ipc => "ipc",
        }
    }
}

impl FromStr for NamespaceShare {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network" => Ok(NamespaceShare::Network),
            "ipc" => Ok(NamespaceShare::Ipc),
            other => Err(PolicyError::parse("shared namespace", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_level_total_order() {
        assert!(BusLevel::None < BusLevel::See);
        assert!(BusLevel::See < BusLevel::Talk);
        assert!(BusLevel::Talk < BusLevel::Own);
    }

    #[test]
    fn test_bus_level_parse() {
        assert_eq!("talk".parse::<BusLevel>().unwrap(), BusLevel::Talk);
        assert!("chat".parse::<BusLevel>().is_err());
    }

    #[test]
    fn test_filesystem_rule_parse() {
        let rule = FilesystemRule::parse("host:ro").unwrap();
        assert_eq!(rule.source, FilesystemSource::Host);
        assert_eq!(rule.mode, FilesystemMode::ReadOnly);

        let rule = FilesystemRule::parse("/opt/data").unwrap();
        assert_eq!(rule.source, FilesystemSource::Path("/opt/data".into()));
        assert_eq!(rule.mode, FilesystemMode::ReadWrite);

        let rule = FilesystemRule::parse("/scratch:tmpfs").unwrap();
        assert_eq!(rule.mode, FilesystemMode::Tmpfs);
    }

    #[test]
    fn test_filesystem_rule_rejects_malformed() {
        assert!(FilesystemRule::parse("relative/path").is_err());
        assert!(FilesystemRule::parse("/data:sideways").is_err());
        assert!(FilesystemRule::parse("").is_err());
    }

    #[test]
    fn test_filesystem_rule_render_roundtrip() {
        for value in ["host:ro", "home", "/opt/data", "/scratch:tmpfs"] {
            let rule = FilesystemRule::parse(value).unwrap();
            assert_eq!(FilesystemRule::parse(&rule.render()).unwrap(), rule);
        }
    }
}
