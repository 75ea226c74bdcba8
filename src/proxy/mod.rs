/*!
 * Bus Filtering Proxy
 * Rule derivation and synchronized proxy launch
 */

pub mod launcher;
pub mod rules;

pub use launcher::{ProxyError, ProxyHandle, ProxyLauncher, ProxyResult, ProxyState};
pub use rules::{ProxyRule, ProxyRuleSet};
