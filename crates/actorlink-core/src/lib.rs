//! # actorlink core
//!
//! Pure data model for the actorlink protocol: identities, bearer secrets,
//! trust relationships, subscriptions, diffs, and suspension keys.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`PeerId`] - A peer as seen by the local actor (actor or OAuth2 client)
//! - [`BearerSecret`] - The credential a peer presents on every call
//! - [`TrustRelationship`] - One side of a dual-approved trust link
//! - [`Subscription`] / [`SubscriptionDiff`] - Interest registrations and their ordered feeds
//! - [`SuspensionKey`] - A paused `(target, subtarget)` pair

pub mod clock;
pub mod error;
pub mod ids;
pub mod secret;
pub mod subscription;
pub mod suspension;
pub mod trust;
pub mod validation;

pub use clock::now_millis;
pub use error::{CoreError, ValidationError};
pub use ids::{ActorId, PeerId, SubscriptionId, OAUTH2_CLIENT_PREFIX};
pub use secret::{BearerSecret, SecretDigest, SECRET_BYTES};
pub use subscription::{
    resource_path, DiffBody, Granularity, Subscription, SubscriptionDiff, SubscriptionRequest,
};
pub use suspension::{SuspensionKey, SuspensionRecord};
pub use trust::{ApprovalState, CapabilitySnapshot, ConnectionMethod, TrustPatch, TrustRelationship};
pub use validation::{
    validate_base_uri, validate_description, validate_relationship_type,
    validate_subscription_request, validate_subtarget, validate_target, MAX_DESCRIPTION_LEN,
};
