//! Permission checks against the actor's trust relationships.
//!
//! The evaluator itself is pure; this layer loads the relationship and its
//! overrides. A relationship that is not fully approved is denied everything.

use actorlink_core::{PeerId, TrustRelationship};
use actorlink_perms::{Decision, Operation, RuleSet, RuleSource, Subject, Verdict};
use actorlink_store::Store;

use crate::actor::Actor;
use crate::error::Result;

impl<S: Store> Actor<S> {
    /// Decide whether `peer_id` may perform `operation` on `path`.
    ///
    /// Fails with `NoSuchTrust` if there is no relationship with the peer.
    pub async fn evaluate(
        &self,
        peer_id: &PeerId,
        path: &str,
        operation: Operation,
    ) -> Result<Decision> {
        Ok(self.explain(peer_id, path, operation).await?.decision)
    }

    /// Like [`evaluate`](Self::evaluate), with the rule that decided.
    pub async fn explain(&self, peer_id: &PeerId, path: &str, operation: Operation) -> Result<Verdict> {
        let trust = self.require_trust(peer_id).await?;
        if !trust.is_fully_approved() {
            return Ok(Verdict {
                decision: Decision::Denied,
                source: RuleSource::NoMatch,
            });
        }

        let overrides = self.store.get_permission_overrides(self.id(), peer_id).await?;
        let verdict = self
            .evaluator
            .explain(&self.subject(&trust, overrides.as_ref()), path, operation);

        tracing::debug!(
            actor = %self.id(),
            peer = %peer_id,
            path,
            operation = %operation,
            decision = ?verdict.decision,
            "permission evaluated"
        );
        Ok(verdict)
    }

    /// Keep the items `peer_id` may access with `operation`, in order.
    pub async fn list_permitted<T, F>(
        &self,
        peer_id: &PeerId,
        items: Vec<T>,
        resource_path: F,
        operation: Operation,
    ) -> Result<Vec<T>>
    where
        F: Fn(&T) -> String,
    {
        let trust = self.require_trust(peer_id).await?;
        if !trust.is_fully_approved() {
            return Ok(Vec::new());
        }

        let overrides = self.store.get_permission_overrides(self.id(), peer_id).await?;
        Ok(self.evaluator.list_permitted(
            &self.subject(&trust, overrides.as_ref()),
            items,
            resource_path,
            operation,
        ))
    }

    pub(crate) fn subject<'a>(
        &'a self,
        trust: &'a TrustRelationship,
        overrides: Option<&'a RuleSet>,
    ) -> Subject<'a> {
        Subject {
            actor_id: self.id(),
            peer_id: &trust.peer_id,
            relationship_type: &trust.relationship_type,
            overrides,
        }
    }
}
