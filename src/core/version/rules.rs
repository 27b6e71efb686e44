// ─── Rule Evaluation ───
// Decides which libraries and arguments apply to a runtime context.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::context::RuntimeContext;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsRule>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    #[serde(alias = "deny")]
    Disallow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Regular expression over the architecture name, matched in full.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    /// Regular expression searched in the OS version string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Rule {
    pub fn allow() -> Self {
        Self {
            action: RuleAction::Allow,
            os: None,
            features: BTreeMap::new(),
        }
    }

    pub fn disallow() -> Self {
        Self {
            action: RuleAction::Disallow,
            ..Self::allow()
        }
    }

    pub fn for_os(mut self, name: &str) -> Self {
        self.os.get_or_insert_with(OsRule::default).name = Some(name.to_string());
        self
    }

    pub fn for_arch(mut self, pattern: &str) -> Self {
        self.os.get_or_insert_with(OsRule::default).arch = Some(pattern.to_string());
        self
    }

    pub fn with_feature(mut self, name: &str, value: bool) -> Self {
        self.features.insert(name.to_string(), value);
        self
    }

    /// All predicates of this rule hold for `ctx`.
    pub fn matches(&self, ctx: &RuntimeContext) -> bool {
        if let Some(os) = &self.os {
            if !os.matches(ctx) {
                return false;
            }
        }

        self.features
            .iter()
            .all(|(name, required)| ctx.feature(name) == *required)
    }
}

impl OsRule {
    fn matches(&self, ctx: &RuntimeContext) -> bool {
        if let Some(name) = &self.name {
            if !ctx.os.matches_name(name) {
                return false;
            }
        }

        if let Some(pattern) = &self.arch {
            let anchored = format!("^(?:{})$", pattern);
            let Some(re) = compile(&anchored) else {
                return false;
            };
            if !ctx.arch_names().iter().any(|arch| re.is_match(arch)) {
                return false;
            }
        }

        if let Some(pattern) = &self.version {
            let Some(re) = compile(pattern) else {
                return false;
            };
            match &ctx.os_version {
                Some(version) if re.is_match(version) => {}
                _ => return false,
            }
        }

        true
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Ignoring rule with invalid pattern {:?}: {}", pattern, e);
            None
        }
    }
}

/// Evaluate a rule list against a context.
///
/// - No rules → included.
/// - Rules are walked in order starting from "excluded"; every rule whose
///   predicates match sets the state to its action, so the last match wins.
pub fn evaluate(rules: &[Rule], ctx: &RuntimeContext) -> bool {
    if rules.is_empty() {
        return true;
    }

    let mut allowed = false;
    for rule in rules {
        if rule.matches(ctx) {
            allowed = rule.action == RuleAction::Allow;
        }
    }
    allowed
}
