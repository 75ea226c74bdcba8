/*!
 * Proxy Rules
 * Projection of the bus-policy table into the filtering proxy's
 * argument grammar
 */

use crate::policy::{BusLevel, BusScope, PolicyContext};

/// One filter rule for a named service or prefix pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRule {
    pub name: String,
    pub level: BusLevel,
}

impl ProxyRule {
    /// Render as a proxy filter argument; entries at level `none` produce
    /// no rule (the proxy denies unlisted names by default).
    pub fn arg(&self) -> Option<String> {
        let flag = match self.level {
            BusLevel::None => return None,
            BusLevel::See => "--see",
            BusLevel::Talk => "--talk",
            BusLevel::Own => "--own",
        };
        Some(format!("{}={}", flag, self.name))
    }
}

/// The per-scope rule sets derived from one merged policy. Recomputed once
/// per run, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyRuleSet {
    pub session: Vec<ProxyRule>,
    pub system: Vec<ProxyRule>,
}

impl ProxyRuleSet {
    /// Project a policy's bus tables. Only entries above `none` yield
    /// rules; a fully-`none` table yields an empty set and the proxy is
    /// skipped entirely.
    pub fn from_policy(policy: &PolicyContext) -> Self {
        let collect = |scope| {
            policy
                .bus_policy(scope)
                .iter()
                .filter(|(_, &level)| level > BusLevel::None)
                .map(|(name, &level)| ProxyRule {
                    name: name.clone(),
                    level,
                })
                .collect()
        };
        Self {
            session: collect(BusScope::Session),
            system: collect(BusScope::System),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.session.is_empty() && self.system.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_entries_yield_no_rules() {
        let mut policy = PolicyContext::new();
        policy.set_bus_policy(BusScope::Session, "org.example.Hidden", BusLevel::None);
        let rules = ProxyRuleSet::from_policy(&policy);
        assert!(rules.is_empty());
    }

    #[test]
    fn test_rule_args() {
        let mut policy = PolicyContext::new();
        policy.set_bus_policy(BusScope::Session, "org.example.Svc", BusLevel::Talk);
        policy.set_bus_policy(BusScope::Session, "org.example.Name.*", BusLevel::Own);
        policy.set_bus_policy(BusScope::System, "org.example.Disk", BusLevel::See);

        let rules = ProxyRuleSet::from_policy(&policy);
        let session_args: Vec<String> =
            rules.session.iter().filter_map(ProxyRule::arg).collect();
        assert!(session_args.contains(&"--talk=org.example.Svc".to_string()));
        assert!(session_args.contains(&"--own=org.example.Name.*".to_string()));
        assert_eq!(
            rules.system[0].arg().unwrap(),
            "--see=org.example.Disk"
        );
    }
}
