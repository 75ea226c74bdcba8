/*!
 * Policy Context
 * The merged set of sandbox permissions governing one run
 */

use super::types::{
    BusLevel, BusScope, DeviceClass, FilesystemRule, NamespaceShare, PolicyResult,
};
use crate::keyfile::KeyFile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known desktop-integration service every sandboxed app may talk to.
pub const DESKTOP_PORTAL_NAME: &str = "org.freedesktop.portal.Desktop";
/// Well-known document-sharing service every sandboxed app may talk to.
pub const DOCUMENTS_PORTAL_NAME: &str = "org.freedesktop.portal.Documents";

const SECTION_CONTEXT: &str = "Context";
const SECTION_SESSION_BUS: &str = "Session Bus Policy";
const SECTION_SYSTEM_BUS: &str = "System Bus Policy";
const SECTION_ENVIRONMENT: &str = "Environment";

const KEY_SHARED: &str = "shared";
const KEY_DEVICES: &str = "devices";
const KEY_FILESYSTEMS: &str = "filesystems";

/// Sandbox permissions for one run: filesystem exposure, device access,
/// namespace sharing, bus access rules and environment overrides.
///
/// Built fresh per invocation by successive merges and never mutated after
/// the final merge. Merging is strict left-to-right override: entries in
/// the later source replace same-key entries, entries absent in the later
/// source are preserved, and nothing is ever unioned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyContext {
    filesystems: Vec<FilesystemRule>,
    devices: BTreeMap<DeviceClass, bool>,
    shares: BTreeMap<NamespaceShare, bool>,
    session_bus_policy: BTreeMap<String, BusLevel>,
    system_bus_policy: BTreeMap<String, BusLevel>,
    env: BTreeMap<String, Option<String>>,
}

impl PolicyContext {
    /// Empty context: no exposure, no shared namespaces, empty bus table,
    /// no environment overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record or overwrite one bus-policy entry.
    pub fn set_bus_policy(&mut self, scope: BusScope, name: impl Into<String>, level: BusLevel) {
        self.bus_table_mut(scope).insert(name.into(), level);
    }

    /// Grant TALK on the two portal services every sandboxed application
    /// must be able to reach regardless of its declared metadata. Seeded
    /// before any metadata is loaded; later sources may still override.
    pub fn seed_baseline_grants(&mut self) {
        self.set_bus_policy(BusScope::Session, DESKTOP_PORTAL_NAME, BusLevel::Talk);
        self.set_bus_policy(BusScope::Session, DOCUMENTS_PORTAL_NAME, BusLevel::Talk);
    }

    /// Add or replace one filesystem rule. An existing rule for the same
    /// source keeps its position; new sources append.
    pub fn add_filesystem(&mut self, rule: FilesystemRule) {
        let key = rule.source.token();
        match self
            .filesystems
            .iter_mut()
            .find(|r| r.source.token() == key)
        {
            Some(existing) => existing.mode = rule.mode,
            None => self.filesystems.push(rule),
        }
    }

    pub fn set_share(&mut self, share: NamespaceShare, enabled: bool) {
        self.shares.insert(share, enabled);
    }

    pub fn set_device(&mut self, device: DeviceClass, enabled: bool) {
        self.devices.insert(device, enabled);
    }

    pub fn set_env(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.env.insert(name.into(), Some(value.into()));
    }

    pub fn unset_env(&mut self, name: impl Into<String>) {
        self.env.insert(name.into(), None);
    }

    /// Filesystem rules in declaration order.
    pub fn filesystems(&self) -> &[FilesystemRule] {
        &self.filesystems
    }

    /// Whether a namespace is shared with the host.
    pub fn shares(&self, share: NamespaceShare) -> bool {
        self.shares.get(&share).copied().unwrap_or(false)
    }

    /// Whether a device class is exposed.
    pub fn allows_device(&self, device: DeviceClass) -> bool {
        self.devices.get(&device).copied().unwrap_or(false)
    }

    /// The bus-policy table for one scope, name → level.
    pub fn bus_policy(&self, scope: BusScope) -> &BTreeMap<String, BusLevel> {
        match scope {
            BusScope::Session => &self.session_bus_policy,
            BusScope::System => &self.system_bus_policy,
        }
    }

    /// Effective level for one bus name, `None` when unmentioned.
    pub fn bus_level(&self, scope: BusScope, name: &str) -> BusLevel {
        self.bus_policy(scope)
            .get(name)
            .copied()
            .unwrap_or(BusLevel::None)
    }

    /// Environment overrides, name → value (`None` = unset the variable).
    pub fn env_overrides(&self) -> &BTreeMap<String, Option<String>> {
        &self.env
    }

    /// Merge `other` into `self`: same-key entries in `other` replace ours,
    /// keys absent from `other` are preserved. Levels are replaced, never
    /// maxed, so composition order encodes precedence.
    pub fn merge(&mut self, other: &PolicyContext) {
        for rule in &other.filesystems {
            self.add_filesystem(rule.clone());
        }
        for (&device, &enabled) in &other.devices {
            self.devices.insert(device, enabled);
        }
        for (&share, &enabled) in &other.shares {
            self.shares.insert(share, enabled);
        }
        for (name, &level) in &other.session_bus_policy {
            self.session_bus_policy.insert(name.clone(), level);
        }
        for (name, &level) in &other.system_bus_policy {
            self.system_bus_policy.insert(name.clone(), level);
        }
        for (name, value) in &other.env {
            self.env.insert(name.clone(), value.clone());
        }
    }

    /// Parse the policy sections of a metadata keyfile into a fresh
    /// context. Unrecognized sections and keys are ignored; malformed
    /// values of recognized keys fail closed.
    pub fn from_metadata(keyfile: &KeyFile) -> PolicyResult<Self> {
        let mut ctx = Self::new();

        if let Some(items) = keyfile.get_list(SECTION_CONTEXT, KEY_SHARED) {
            for item in items {
                let (name, enabled) = split_negation(&item);
                ctx.set_share(name.parse()?, enabled);
            }
        }
        if let Some(items) = keyfile.get_list(SECTION_CONTEXT, KEY_DEVICES) {
            for item in items {
                let (name, enabled) = split_negation(&item);
                ctx.set_device(name.parse()?, enabled);
            }
        }
        if let Some(items) = keyfile.get_list(SECTION_CONTEXT, KEY_FILESYSTEMS) {
            for item in items {
                ctx.add_filesystem(FilesystemRule::parse(&item)?);
            }
        }

        for (name, level) in keyfile.entries(SECTION_SESSION_BUS) {
            ctx.set_bus_policy(BusScope::Session, name, level.parse()?);
        }
        for (name, level) in keyfile.entries(SECTION_SYSTEM_BUS) {
            ctx.set_bus_policy(BusScope::System, name, level.parse()?);
        }

        for (name, value) in keyfile.entries(SECTION_ENVIRONMENT) {
            if value.is_empty() {
                ctx.unset_env(name);
            } else {
                ctx.set_env(name, value);
            }
        }

        Ok(ctx)
    }

    /// Merge the policy sections of a metadata keyfile into this context,
    /// with the keyfile's entries taking precedence.
    pub fn load_from_metadata(&mut self, keyfile: &KeyFile) -> PolicyResult<()> {
        let parsed = Self::from_metadata(keyfile)?;
        self.merge(&parsed);
        Ok(())
    }

    /// Serialize into the policy sections of a keyfile. Together with
    /// [`from_metadata`](Self::from_metadata) this round-trips losslessly.
    pub fn save_to_keyfile(&self, keyfile: &mut KeyFile) {
        if !self.shares.is_empty() {
            keyfile.set_list(
                SECTION_CONTEXT,
                KEY_SHARED,
                self.shares.iter().map(|(s, &on)| negatable(s.as_str(), on)),
            );
        }
        if !self.devices.is_empty() {
            keyfile.set_list(
                SECTION_CONTEXT,
                KEY_DEVICES,
                self.devices.iter().map(|(d, &on)| negatable(d.as_str(), on)),
            );
        }
        if !self.filesystems.is_empty() {
            keyfile.set_list(
                SECTION_CONTEXT,
                KEY_FILESYSTEMS,
                self.filesystems.iter().map(FilesystemRule::render),
            );
        }
        for (name, &level) in &self.session_bus_policy {
            keyfile.set(SECTION_SESSION_BUS, name, level.as_str());
        }
        for (name, &level) in &self.system_bus_policy {
            keyfile.set(SECTION_SYSTEM_BUS, name, level.as_str());
        }
        for (name, value) in &self.env {
            keyfile.set(SECTION_ENVIRONMENT, name, value.as_deref().unwrap_or(""));
        }
    }

    fn bus_table_mut(&mut self, scope: BusScope) -> &mut BTreeMap<String, BusLevel> {
        match scope {
            BusScope::Session => &mut self.session_bus_policy,
            BusScope::System => &mut self.system_bus_policy,
        }
    }
}

fn split_negation(item: &str) -> (&str, bool) {
    match item.strip_prefix('!') {
        Some(name) => (name, false),
        None => (item, true),
    }
}

fn negatable(name: &str, enabled: bool) -> String {
    if enabled {
        name.to_string()
    } else {
        format!("!{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::types::{FilesystemMode, FilesystemSource};

    fn metadata(text: &str) -> KeyFile {
        KeyFile::parse(text).unwrap()
    }

    #[test]
    fn test_merge_is_override_not_union() {
        let mut base = PolicyContext::new();
        base.set_bus_policy(BusScope::Session, "org.example.Svc", BusLevel::See);

        let mut other = PolicyContext::new();
        other.set_bus_policy(BusScope::Session, "org.example.Svc", BusLevel::None);

        base.merge(&other);
        assert_eq!(
            base.bus_level(BusScope::Session, "org.example.Svc"),
            BusLevel::None
        );
    }

    #[test]
    fn test_baseline_survives_unrelated_merges() {
        let mut ctx = PolicyContext::new();
        ctx.seed_baseline_grants();

        let other = PolicyContext::from_metadata(&metadata(
            "[Session Bus Policy]\norg.other.Svc=own\n",
        ))
        .unwrap();
        ctx.merge(&other);

        assert_eq!(
            ctx.bus_level(BusScope::Session, DESKTOP_PORTAL_NAME),
            BusLevel::Talk
        );
        assert_eq!(
            ctx.bus_level(BusScope::Session, DOCUMENTS_PORTAL_NAME),
            BusLevel::Talk
        );
        assert_eq!(
            ctx.bus_level(BusScope::Session, "org.other.Svc"),
            BusLevel::Own
        );
    }

    #[test]
    fn test_from_metadata_reads_all_sections() {
        let ctx = PolicyContext::from_metadata(&metadata(
            "[Context]\n\
             shared=network;!ipc;\n\
             devices=dri;\n\
             filesystems=host:ro;/opt/data;\n\
             [Session Bus Policy]\n\
             org.example.Svc=talk\n\
             [System Bus Policy]\n\
             org.example.Disk=see\n\
             [Environment]\n\
             FOO=bar\n\
             GONE=\n",
        ))
        .unwrap();

        assert!(ctx.shares(NamespaceShare::Network));
        assert!(!ctx.shares(NamespaceShare::Ipc));
        assert!(ctx.allows_device(DeviceClass::Gpu));
        assert_eq!(ctx.filesystems().len(), 2);
        assert_eq!(ctx.filesystems()[0].mode, FilesystemMode::ReadOnly);
        assert_eq!(
            ctx.bus_level(BusScope::Session, "org.example.Svc"),
            BusLevel::Talk
        );
        assert_eq!(
            ctx.bus_level(BusScope::System, "org.example.Disk"),
            BusLevel::See
        );
        assert_eq!(ctx.env_overrides()["FOO"], Some("bar".to_string()));
        assert_eq!(ctx.env_overrides()["GONE"], None);
    }

    #[test]
    fn test_unrecognized_keys_ignored() {
        let ctx = PolicyContext::from_metadata(&metadata(
            "[Context]\nsockets=x11;\n[Shiny New Section]\nk=v\n",
        ))
        .unwrap();
        assert_eq!(ctx, PolicyContext::new());
    }

    #[test]
    fn test_malformed_values_fail_closed() {
        assert!(PolicyContext::from_metadata(&metadata(
            "[Session Bus Policy]\norg.example.Svc=supervisor\n"
        ))
        .is_err());
        assert!(PolicyContext::from_metadata(&metadata(
            "[Context]\nshared=network;telepathy;\n"
        ))
        .is_err());
        assert!(PolicyContext::from_metadata(&metadata(
            "[Context]\nfilesystems=not-absolute;\n"
        ))
        .is_err());
    }

    #[test]
    fn test_keyfile_roundtrip() {
        let mut ctx = PolicyContext::new();
        ctx.seed_baseline_grants();
        ctx.set_share(NamespaceShare::Network, true);
        ctx.set_device(DeviceClass::Gpu, false);
        ctx.add_filesystem(FilesystemRule::new(
            FilesystemSource::Home,
            FilesystemMode::ReadOnly,
        ));
        ctx.add_filesystem(FilesystemRule::new(
            FilesystemSource::Path("/scratch".into()),
            FilesystemMode::Tmpfs,
        ));
        ctx.set_bus_policy(BusScope::System, "org.example.Disk", BusLevel::See);
        ctx.set_env("FOO", "bar");
        ctx.unset_env("GONE");

        let mut keyfile = KeyFile::new();
        ctx.save_to_keyfile(&mut keyfile);
        let reloaded = PolicyContext::from_metadata(&keyfile).unwrap();
        assert_eq!(ctx, reloaded);
    }

    #[test]
    fn test_filesystem_merge_replaces_mode_in_place() {
        let mut base = PolicyContext::new();
        base.add_filesystem(FilesystemRule::parse("/opt/data:ro").unwrap());
        base.add_filesystem(FilesystemRule::parse("home").unwrap());

        let mut other = PolicyContext::new();
        other.add_filesystem(FilesystemRule::parse("/opt/data:rw").unwrap());

        base.merge(&other);
        assert_eq!(base.filesystems().len(), 2);
        assert_eq!(base.filesystems()[0].mode, FilesystemMode::ReadWrite);
        assert_eq!(base.filesystems()[1].source, FilesystemSource::Home);
    }
}
