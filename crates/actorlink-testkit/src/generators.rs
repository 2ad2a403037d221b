//! Proptest generators for property-based testing.

use proptest::prelude::*;

use actorlink::core::{ActorId, Granularity, PeerId, SubscriptionRequest, SuspensionKey};
use actorlink::perms::{AccessRule, Operation, RuleSet};

/// Generate an actor id.
pub fn actor_id() -> impl Strategy<Value = ActorId> {
    "[a-z0-9]{1,24}".prop_filter_map("valid actor id", |s| ActorId::new(s).ok())
}

/// Generate a peer id of either kind.
pub fn peer_id() -> impl Strategy<Value = PeerId> {
    prop_oneof![
        "[a-z0-9]{1,24}".prop_map(PeerId::simple),
        ("[a-z]{1,8}@[a-z]{1,8}\\.org", "[A-Za-z0-9_-]{1,16}")
            .prop_map(|(email, client_id)| PeerId::oauth2_client(email, client_id)),
    ]
}

/// Generate a subscription target.
pub fn target() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("properties".to_string()),
        Just("methods".to_string()),
        Just("actions".to_string()),
        "[a-z]{1,10}",
    ]
}

/// Generate a subtarget, `""` being the wildcard.
pub fn subtarget() -> impl Strategy<Value = String> {
    prop_oneof![Just(String::new()), "[a-z]{1,8}"]
}

/// Generate a granularity.
pub fn granularity() -> impl Strategy<Value = Granularity> {
    prop_oneof![
        Just(Granularity::None),
        Just(Granularity::Low),
        Just(Granularity::High),
    ]
}

/// Generate an operation.
pub fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        Just(Operation::Read),
        Just(Operation::Write),
        Just(Operation::Subscribe),
    ]
}

/// Generate a resource path such as `properties/status/x`.
pub fn resource_path() -> impl Strategy<Value = String> {
    (target(), subtarget(), subtarget())
        .prop_map(|(t, s, r)| actorlink::core::resource_path(&t, &s, &r))
}

/// Generate a valid subscription request.
pub fn subscription_request() -> impl Strategy<Value = SubscriptionRequest> {
    (target(), subtarget(), subtarget(), granularity(), any::<bool>()).prop_map(
        |(target, subtarget, resource, granularity, callback)| {
            let mut request = SubscriptionRequest::new(target, granularity)
                .subtarget(subtarget)
                .resource(resource);
            request.callback = callback;
            request
        },
    )
}

/// Generate a suspension key.
pub fn suspension_key() -> impl Strategy<Value = SuspensionKey> {
    (target(), proptest::option::of(subtarget()))
        .prop_map(|(target, subtarget)| SuspensionKey::new(target, subtarget.as_deref()))
}

/// Generate a rule, exact or prefix, granting a subset of operations.
pub fn access_rule() -> impl Strategy<Value = AccessRule> {
    (
        resource_path(),
        any::<bool>(),
        proptest::sample::subsequence(Operation::ALL.to_vec(), 0..=3),
    )
        .prop_filter_map("valid pattern", |(path, prefix, ops)| {
            let pattern = if prefix { format!("{path}/*") } else { path };
            AccessRule::allow(&pattern, ops).ok()
        })
}

/// Generate a rule set of up to `max_rules` rules.
pub fn rule_set(max_rules: usize) -> impl Strategy<Value = RuleSet> {
    prop::collection::vec(access_rule(), 0..=max_rules).prop_map(RuleSet::from_rules)
}
