//! Access rules: operations, path patterns, and ordered rule sets.
//!
//! A rule pairs a path pattern with the operations it allows. A rule that
//! matches a path but does not list an operation is an explicit deny for
//! that operation; there is no separate deny list.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{PermsError, Result};

/// An operation a peer may perform on a resource path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
    Subscribe,
}

impl Operation {
    /// All operations, in canonical order.
    pub const ALL: [Operation; 3] = [Operation::Read, Operation::Write, Operation::Subscribe];

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Subscribe => "subscribe",
        }
    }
}

impl FromStr for Operation {
    type Err = PermsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "read" => Ok(Operation::Read),
            "write" => Ok(Operation::Write),
            "subscribe" => Ok(Operation::Subscribe),
            other => Err(PermsError::UnknownOperation(other.to_string())),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How strongly a pattern matched a path.
///
/// Exact matches outrank every prefix match; among prefix matches the longer
/// prefix wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Specificity {
    Prefix(usize),
    Exact,
}

/// A resource path pattern.
///
/// `properties/status` matches only that path. A trailing `*` turns the
/// pattern into a prefix match, and a pattern ending in `/*` also matches
/// the bare collection root, so `properties/*` matches `properties`.
/// A lone `*` matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathPattern {
    raw: String,
}

impl PathPattern {
    /// Parse a pattern. `*` is only allowed as the final character.
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let raw = pattern.into();
        if raw.is_empty() {
            return Err(PermsError::InvalidPattern {
                pattern: raw,
                reason: "empty pattern",
            });
        }
        if raw.trim_end_matches('*').contains('*') || raw.ends_with("**") {
            return Err(PermsError::InvalidPattern {
                pattern: raw,
                reason: "'*' is only allowed as the final character",
            });
        }
        Ok(Self { raw })
    }

    /// Build from a pattern known to be well formed.
    pub(crate) fn builtin(pattern: &str) -> Self {
        Self {
            raw: pattern.to_string(),
        }
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this is a prefix pattern.
    pub fn is_prefix(&self) -> bool {
        self.raw.ends_with('*')
    }

    /// Match `path`, returning how specific the match was.
    pub fn matches(&self, path: &str) -> Option<Specificity> {
        let Some(prefix) = self.raw.strip_suffix('*') else {
            return (self.raw == path).then_some(Specificity::Exact);
        };

        if path.starts_with(prefix) {
            return Some(Specificity::Prefix(prefix.len()));
        }

        match prefix.strip_suffix('/') {
            Some(root) if root == path => Some(Specificity::Prefix(prefix.len())),
            _ => None,
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for PathPattern {
    type Err = PermsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for PathPattern {
    type Error = PermsError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<PathPattern> for String {
    fn from(pattern: PathPattern) -> Self {
        pattern.raw
    }
}

/// One rule: a path pattern and the operations it allows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    /// Paths this rule applies to.
    pub path: PathPattern,

    /// Operations allowed on matching paths. Empty denies everything.
    #[serde(default)]
    pub operations: BTreeSet<Operation>,
}

impl AccessRule {
    /// Allow `operations` on paths matching `pattern`.
    pub fn allow(pattern: &str, operations: impl IntoIterator<Item = Operation>) -> Result<Self> {
        Ok(Self {
            path: PathPattern::new(pattern)?,
            operations: operations.into_iter().collect(),
        })
    }

    /// Deny every operation on paths matching `pattern`.
    pub fn deny(pattern: &str) -> Result<Self> {
        Self::allow(pattern, [])
    }

    /// Whether the rule lists `operation`.
    pub fn permits(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }
}

/// An ordered list of rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<AccessRule>,
}

impl RuleSet {
    /// An empty rule set. It matches nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from rules.
    pub fn from_rules(rules: Vec<AccessRule>) -> Self {
        Self { rules }
    }

    /// Append a rule.
    pub fn push(&mut self, rule: AccessRule) {
        self.rules.push(rule);
    }

    /// Builder form of [`push`](Self::push).
    pub fn with(mut self, rule: AccessRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// The rules, in declaration order.
    pub fn rules(&self) -> &[AccessRule] {
        &self.rules
    }

    /// Whether the set has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The most specific rule matching `path`.
    ///
    /// On equal specificity the earlier rule wins.
    pub fn best_match(&self, path: &str) -> Option<&AccessRule> {
        let mut best: Option<(Specificity, &AccessRule)> = None;
        for rule in &self.rules {
            let Some(specificity) = rule.path.matches(path) else {
                continue;
            };
            match best {
                Some((current, _)) if current >= specificity => {}
                _ => best = Some((specificity, rule)),
            }
        }
        best.map(|(_, rule)| rule)
    }
}
