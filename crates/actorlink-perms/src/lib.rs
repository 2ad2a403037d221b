//! # actorlink permissions
//!
//! The policy gate consulted by trust, subscription, and every protocol
//! adapter before exposing or mutating data.
//!
//! ## Overview
//!
//! Access is expressed as path rules. A [`RuleSet`] is an ordered list of
//! [`AccessRule`]s, each pairing a [`PathPattern`] with the [`Operation`]s it
//! allows. Every relationship type has a default rule set in the
//! [`PolicyConfig`]; individual trusts may carry override rules that take
//! precedence.
//!
//! Evaluation fails closed: a path no rule matches is denied.
//!
//! ## Usage
//!
//! ```rust
//! use actorlink_core::{ActorId, PeerId};
//! use actorlink_perms::{Decision, Operation, PermissionEvaluator, Subject};
//!
//! let actor = ActorId::new("owner").unwrap();
//! let peer = PeerId::simple("friend-1");
//! let subject = Subject {
//!     actor_id: &actor,
//!     peer_id: &peer,
//!     relationship_type: "friend",
//!     overrides: None,
//! };
//!
//! let eval = PermissionEvaluator::default();
//! assert_eq!(eval.evaluate(&subject, "properties/status", Operation::Read), Decision::Allowed);
//! assert_eq!(eval.evaluate(&subject, "properties/status", Operation::Write), Decision::Denied);
//! ```

pub mod error;
pub mod evaluator;
pub mod policy;
pub mod rules;

pub use error::{PermsError, Result};
pub use evaluator::{Decision, PermissionEvaluator, RuleSource, Subject, Verdict};
pub use policy::PolicyConfig;
pub use rules::{AccessRule, Operation, PathPattern, RuleSet, Specificity};
