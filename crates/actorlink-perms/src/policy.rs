//! Relationship-type policy.
//!
//! A policy maps each relationship type to its default rule set. Types the
//! policy does not name get no access at all.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::rules::{AccessRule, Operation, PathPattern, RuleSet};

/// Default rules per relationship type.
///
/// The JSON form is:
///
/// ```json
/// {
///   "relationships": {
///     "friend": [{ "path": "properties/*", "operations": ["read", "subscribe"] }]
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub relationships: BTreeMap<String, RuleSet>,
}

impl PolicyConfig {
    /// A policy that grants nothing.
    pub fn empty() -> Self {
        Self {
            relationships: BTreeMap::new(),
        }
    }

    /// Parse a policy from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the rules for a relationship type.
    pub fn with_relationship(mut self, relationship_type: impl Into<String>, rules: RuleSet) -> Self {
        self.relationships.insert(relationship_type.into(), rules);
        self
    }

    /// The default rules for a relationship type.
    pub fn rules_for(&self, relationship_type: &str) -> Option<&RuleSet> {
        self.relationships.get(relationship_type)
    }
}

impl Default for PolicyConfig {
    /// The built-in relationship types.
    fn default() -> Self {
        use Operation::{Read, Subscribe, Write};

        let rule = |pattern: &str, ops: &[Operation]| AccessRule {
            path: PathPattern::builtin(pattern),
            operations: ops.iter().copied().collect(),
        };

        Self::empty()
            .with_relationship("admin", RuleSet::from_rules(vec![rule("*", &[Read, Write, Subscribe])]))
            .with_relationship("friend", RuleSet::from_rules(vec![rule("properties/*", &[Read, Subscribe])]))
            .with_relationship(
                "partner",
                RuleSet::from_rules(vec![rule("properties/*", &[Read, Write, Subscribe])]),
            )
            .with_relationship("viewer", RuleSet::from_rules(vec![rule("properties/*", &[Read])]))
            .with_relationship(
                "mcp_client",
                RuleSet::from_rules(vec![
                    rule("properties/*", &[Read]),
                    rule("methods/*", &[Write]),
                    rule("actions/*", &[Write]),
                ]),
            )
    }
}
