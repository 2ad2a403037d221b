//! Suspension registry.
//!
//! While a `(target, subtarget)` key is suspended, subscriptions on exactly
//! that key receive no diffs. Resuming appends one resync marker to each of
//! them so subscribers know to refetch.

use actorlink_core::{
    now_millis, validate_subtarget, validate_target, DiffBody, SuspensionKey, SuspensionRecord,
};
use actorlink_store::{Store, StoreError};

use crate::actor::Actor;
use crate::error::Result;
use crate::events::ProtocolEvent;
use crate::feed::RegisteredDiff;

impl<S: Store> Actor<S> {
    /// Suspend diff registration for a key.
    ///
    /// Returns `true` if the key was not already suspended.
    pub async fn suspend(&self, target: &str, subtarget: Option<&str>) -> Result<bool> {
        let key = checked_key(target, subtarget)?;
        let _guard = self.suspension_locks.lock(&key).await;

        let record = SuspensionRecord {
            actor_id: self.id().clone(),
            key: key.clone(),
            created_at: now_millis(),
        };
        let inserted = self.store.insert_suspension(&record).await?;
        if inserted {
            tracing::info!(actor = %self.id(), key = %key, "diffs suspended");
        }
        Ok(inserted)
    }

    /// Resume a key. Returns the number of resync markers issued, `0` if the
    /// key was not suspended.
    pub async fn resume(&self, target: &str, subtarget: Option<&str>) -> Result<usize> {
        Ok(self.resume_with_resyncs(target, subtarget).await?.len())
    }

    /// Resume a key and return the resync markers it issued, ready for
    /// [`deliver_callbacks`](Actor::deliver_callbacks).
    pub async fn resume_with_resyncs(
        &self,
        target: &str,
        subtarget: Option<&str>,
    ) -> Result<Vec<RegisteredDiff>> {
        let key = checked_key(target, subtarget)?;
        let _guard = self.suspension_locks.lock(&key).await;

        if !self.store.delete_suspension(self.id(), &key).await? {
            return Ok(Vec::new());
        }

        let subscriptions = self.store.list_subscriptions(self.id(), None).await?;
        let mut resyncs = Vec::new();
        for subscription in subscriptions {
            if SuspensionKey::for_subscription(&subscription.target, &subscription.subtarget) != key
            {
                continue;
            }

            let diff = match self
                .store
                .append_diff(
                    self.id(),
                    &subscription.subscription_id,
                    &DiffBody::Resync,
                    now_millis(),
                )
                .await
            {
                Ok(diff) => diff,
                Err(StoreError::NotFound(_)) => continue,
                Err(err) => return Err(err.into()),
            };

            self.emit(ProtocolEvent::ResyncIssued {
                actor_id: self.id().clone(),
                subscription_id: subscription.subscription_id.clone(),
                key: key.clone(),
                sequence: diff.sequence,
            });
            resyncs.push(RegisteredDiff { subscription, diff });
        }

        tracing::info!(
            actor = %self.id(),
            key = %key,
            resyncs = resyncs.len(),
            "diffs resumed"
        );
        Ok(resyncs)
    }

    /// Whether a key is suspended.
    pub async fn is_suspended(&self, target: &str, subtarget: Option<&str>) -> Result<bool> {
        let key = SuspensionKey::new(target, subtarget);
        Ok(self.store.has_suspension(self.id(), &key).await?)
    }

    /// List suspended keys, ordered by key.
    pub async fn list_suspended(&self) -> Result<Vec<SuspensionKey>> {
        let records = self.store.list_suspensions(self.id()).await?;
        Ok(records.into_iter().map(|r| r.key).collect())
    }
}

fn checked_key(target: &str, subtarget: Option<&str>) -> Result<SuspensionKey> {
    validate_target(target)?;
    if let Some(subtarget) = subtarget {
        validate_subtarget(subtarget)?;
    }
    Ok(SuspensionKey::new(target, subtarget))
}
