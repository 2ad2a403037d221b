//! Permission evaluation.
//!
//! Resolution order for `(subject, path, operation)`:
//!
//! 1. The subject's per-trust override rules, if any rule matches the path.
//! 2. The relationship type's default rules, if any rule matches.
//! 3. Deny.
//!
//! The first layer with a matching rule decides; within a layer the most
//! specific rule decides. Evaluation is pure and never errors.

use actorlink_core::{ActorId, PeerId};

use crate::policy::PolicyConfig;
use crate::rules::{AccessRule, Operation, RuleSet};

/// Outcome of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    Allowed,
    Denied,
}

impl Decision {
    /// Whether access was granted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Which rule produced a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    /// A per-trust override rule.
    Override { pattern: String },
    /// A default rule of the subject's relationship type.
    RelationshipDefault {
        relationship_type: String,
        pattern: String,
    },
    /// Nothing matched.
    NoMatch,
}

/// A decision together with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    pub source: RuleSource,
}

/// Who is asking: the peer of a trust relationship held by `actor_id`.
#[derive(Debug, Clone, Copy)]
pub struct Subject<'a> {
    pub actor_id: &'a ActorId,
    pub peer_id: &'a PeerId,
    pub relationship_type: &'a str,
    pub overrides: Option<&'a RuleSet>,
}

/// Evaluates operations against a relationship-type policy.
#[derive(Debug, Clone, Default)]
pub struct PermissionEvaluator {
    policy: PolicyConfig,
}

impl PermissionEvaluator {
    /// Create an evaluator over `policy`.
    pub fn new(policy: PolicyConfig) -> Self {
        Self { policy }
    }

    /// The policy in use.
    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    /// Decide whether `subject` may perform `operation` on `path`.
    pub fn evaluate(&self, subject: &Subject<'_>, path: &str, operation: Operation) -> Decision {
        self.explain(subject, path, operation).decision
    }

    /// Like [`evaluate`](Self::evaluate), also reporting the deciding rule.
    pub fn explain(&self, subject: &Subject<'_>, path: &str, operation: Operation) -> Verdict {
        if let Some(rule) = subject.overrides.and_then(|rules| rules.best_match(path)) {
            return Verdict {
                decision: decide(rule, operation),
                source: RuleSource::Override {
                    pattern: rule.path.to_string(),
                },
            };
        }

        let default_rule = self
            .policy
            .rules_for(subject.relationship_type)
            .and_then(|rules| rules.best_match(path));
        if let Some(rule) = default_rule {
            return Verdict {
                decision: decide(rule, operation),
                source: RuleSource::RelationshipDefault {
                    relationship_type: subject.relationship_type.to_string(),
                    pattern: rule.path.to_string(),
                },
            };
        }

        Verdict {
            decision: Decision::Denied,
            source: RuleSource::NoMatch,
        }
    }

    /// Keep the items whose resource path `subject` may access with
    /// `operation`. Order is preserved.
    pub fn list_permitted<T, F>(
        &self,
        subject: &Subject<'_>,
        items: impl IntoIterator<Item = T>,
        resource_path: F,
        operation: Operation,
    ) -> Vec<T>
    where
        F: Fn(&T) -> String,
    {
        items
            .into_iter()
            .filter(|item| {
                self.evaluate(subject, &resource_path(item), operation)
                    .is_allowed()
            })
            .collect()
    }
}

fn decide(rule: &AccessRule, operation: Operation) -> Decision {
    if rule.permits(operation) {
        Decision::Allowed
    } else {
        Decision::Denied
    }
}
