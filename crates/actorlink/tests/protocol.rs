//! End-to-end protocol tests over an in-memory peer network.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use actorlink::core::ConnectionMethod;
use actorlink::peer::{
    features, DiffNoticeBody, MemoryClientRegistry, MemoryPeerNetwork, PeerEndpoint, PeerTransport,
    PROTOCOL_VERSION,
};
use actorlink::perms::AccessRule;
use actorlink::store::{MemoryStore, SqliteStore};
use actorlink::{
    Actor, ActorId, ActorIdentity, ApprovalOrigin, Decision, DiffBody, DuplicateTrustPolicy,
    EventSink, Granularity, Operation, PeerId, ProtocolConfig, ProtocolError, ProtocolEvent,
    RuleSet, SubscriptionRequest, TrustPatch,
};

#[derive(Default)]
struct Recorder(Mutex<Vec<ProtocolEvent>>);

impl EventSink for Recorder {
    fn emit(&self, event: ProtocolEvent) {
        self.0.lock().unwrap().push(event);
    }
}

impl Recorder {
    fn count(&self, pred: impl Fn(&ProtocolEvent) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    fn approvals(&self, origin: ApprovalOrigin) -> usize {
        self.count(|e| matches!(e, ProtocolEvent::TrustFullyApproved { origin: o, .. } if *o == origin))
    }
}

struct Node {
    actor: Arc<Actor<MemoryStore>>,
    events: Arc<Recorder>,
}

impl Node {
    fn peer_id(&self) -> PeerId {
        self.actor.id().as_peer()
    }
}

async fn node(network: &Arc<MemoryPeerNetwork>, name: &str, config: ProtocolConfig) -> Node {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let identity = ActorIdentity::new(
        ActorId::new(name).unwrap(),
        format!("https://{name}.example/{name}"),
    )
    .unwrap();
    let events = Arc::new(Recorder::default());
    let transport: Arc<dyn PeerTransport> = network.clone();
    let actor = Arc::new(
        Actor::new(identity, MemoryStore::new(), transport, config).with_event_sink(events.clone()),
    );

    let endpoint: Arc<dyn PeerEndpoint> = actor.clone();
    network.register(actor.base_uri(), &endpoint).await;
    Node { actor, events }
}

/// Alice and Bob with a fully approved `friend` relationship.
async fn befriended() -> (Arc<MemoryPeerNetwork>, Node, Node) {
    let network = MemoryPeerNetwork::new();
    let alice = node(&network, "alice", ProtocolConfig::default()).await;
    let bob = node(&network, "bob", ProtocolConfig::default()).await;

    alice
        .actor
        .initiate_trust(bob.actor.base_uri(), "friend", "")
        .await
        .unwrap();
    bob.actor.approve_trust(&alice.peer_id()).await.unwrap();
    (network, alice, bob)
}

// ─────────────────────────────────────────────────────────────────────────────
// Trust
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_dual_approval_fires_once_per_side() {
    let network = MemoryPeerNetwork::new();
    let alice = node(&network, "alice", ProtocolConfig::default()).await;
    let bob = node(&network, "bob", ProtocolConfig::default()).await;

    let initiated = alice
        .actor
        .initiate_trust(bob.actor.base_uri(), "friend", "hello")
        .await
        .unwrap();
    assert!(initiated.approved);
    assert!(!initiated.peer_approved);

    let pending = bob.actor.get_trust(&alice.peer_id()).await.unwrap().unwrap();
    assert!(!pending.approved);
    assert!(pending.peer_approved);
    assert!(!pending.verified);
    assert_eq!(pending.secret, initiated.secret);
    assert_eq!(
        bob.events
            .count(|e| matches!(e, ProtocolEvent::TrustRequested { .. })),
        1
    );

    bob.actor.approve_trust(&alice.peer_id()).await.unwrap();
    bob.actor.approve_trust(&alice.peer_id()).await.unwrap();

    let a = alice.actor.get_trust(&bob.peer_id()).await.unwrap().unwrap();
    let b = bob.actor.get_trust(&alice.peer_id()).await.unwrap().unwrap();
    assert!(a.is_fully_approved());
    assert!(b.is_fully_approved());

    assert_eq!(bob.events.approvals(ApprovalOrigin::Local), 1);
    assert_eq!(alice.events.approvals(ApprovalOrigin::Remote), 1);
    assert_eq!(alice.events.approvals(ApprovalOrigin::Local), 0);
}

#[tokio::test]
async fn test_auto_approve_completes_handshake() {
    let network = MemoryPeerNetwork::new();
    let alice = node(&network, "alice", ProtocolConfig::default()).await;
    let bob = node(
        &network,
        "bob",
        ProtocolConfig::default().with_auto_approve("friend"),
    )
    .await;

    let trust = alice
        .actor
        .initiate_trust(bob.actor.base_uri(), "friend", "")
        .await
        .unwrap();
    assert!(trust.is_fully_approved());
    assert_eq!(alice.events.approvals(ApprovalOrigin::Remote), 1);
    assert_eq!(bob.events.approvals(ApprovalOrigin::Local), 1);
}

#[tokio::test]
async fn test_failed_handshake_leaves_no_local_record() {
    let network = MemoryPeerNetwork::new();
    let alice = node(
        &network,
        "alice",
        ProtocolConfig::default().with_peer_timeout(Duration::from_millis(50)),
    )
    .await;
    let bob = node(&network, "bob", ProtocolConfig::default()).await;

    network
        .set_latency(bob.actor.base_uri(), Duration::from_millis(500))
        .await;
    let err = alice
        .actor
        .initiate_trust(bob.actor.base_uri(), "friend", "")
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::PeerUnreachable(_)));
    assert!(alice.actor.list_trusts(None).await.unwrap().is_empty());

    let err = alice
        .actor
        .initiate_trust("https://nobody.example/x", "friend", "")
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::PeerUnreachable(_)));
    assert!(alice.actor.list_trusts(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_peer_rejection_is_reported() {
    let network = MemoryPeerNetwork::new();
    let alice = node(&network, "alice", ProtocolConfig::default()).await;
    let bob = node(&network, "bob", ProtocolConfig::default()).await;

    let err = alice
        .actor
        .initiate_trust(bob.actor.base_uri(), "not a type!", "")
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Validation(_)));

    alice
        .actor
        .initiate_trust(bob.actor.base_uri(), "friend", "")
        .await
        .unwrap();
    // Bob already trusts alice; a fresh alice instance under another store asks again.
    let alice_again = node(&network, "alice", ProtocolConfig::default()).await;
    let err = alice_again
        .actor
        .initiate_trust(bob.actor.base_uri(), "friend", "")
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::PeerRejected(_)));
    assert!(alice_again.actor.list_trusts(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_initiation_rejected() {
    let (_network, alice, bob) = befriended().await;

    let err = alice
        .actor
        .initiate_trust(bob.actor.base_uri(), "friend", "")
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::DuplicateTrust(_)));
    assert_eq!(alice.actor.list_trusts(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_initiation_rotates_secret() {
    let network = MemoryPeerNetwork::new();
    let config = ProtocolConfig::default().with_duplicate_trust(DuplicateTrustPolicy::Rotate);
    let alice = node(&network, "alice", config.clone()).await;
    let bob = node(&network, "bob", config).await;

    let first = alice
        .actor
        .initiate_trust(bob.actor.base_uri(), "friend", "")
        .await
        .unwrap();
    let second = alice
        .actor
        .initiate_trust(bob.actor.base_uri(), "friend", "")
        .await
        .unwrap();
    assert_ne!(first.secret, second.secret);

    for actor in [&alice.actor, &bob.actor] {
        assert!(matches!(
            actor.authenticate(&first.secret).await,
            Err(ProtocolError::InvalidSecret)
        ));
        assert!(actor.authenticate(&second.secret).await.is_ok());
        assert_eq!(actor.list_trusts(None).await.unwrap().len(), 1);
    }
}

#[tokio::test]
async fn test_authenticate_by_secret() {
    let (_network, alice, bob) = befriended().await;
    let trust = bob.actor.get_trust(&alice.peer_id()).await.unwrap().unwrap();
    assert!(trust.last_accessed_at.is_none());

    let authed = bob.actor.authenticate(&trust.secret).await.unwrap();
    assert_eq!(authed.peer_id, alice.peer_id());
    assert!(authed.last_accessed_at.is_some());

    let err = bob
        .actor
        .authenticate(&actorlink::BearerSecret::generate())
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidSecret));
}

#[tokio::test]
async fn test_verify_trust_token() {
    let (_network, alice, bob) = befriended().await;
    let token = alice
        .actor
        .get_trust(&bob.peer_id())
        .await
        .unwrap()
        .unwrap()
        .verification_token
        .unwrap();

    assert!(!bob.actor.verify_trust(&alice.peer_id(), "wrong").await.unwrap());
    assert!(bob.actor.verify_trust(&alice.peer_id(), &token).await.unwrap());
    let trust = bob.actor.get_trust(&alice.peer_id()).await.unwrap().unwrap();
    assert!(trust.verified);
}

#[tokio::test]
async fn test_modify_trust() {
    let (_network, alice, bob) = befriended().await;

    let changed = bob
        .actor
        .modify_trust(&alice.peer_id(), TrustPatch::new().description("old friend"))
        .await
        .unwrap();
    assert!(changed);
    let trust = bob.actor.get_trust(&alice.peer_id()).await.unwrap().unwrap();
    assert_eq!(trust.description, "old friend");

    let patch = TrustPatch {
        relationship_type: Some("admin".into()),
        ..TrustPatch::new()
    };
    let err = bob
        .actor
        .modify_trust(&alice.peer_id(), patch)
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::ImmutableField("relationship_type")));

    let absent = bob
        .actor
        .modify_trust(&PeerId::simple("carol"), TrustPatch::new().description("x"))
        .await
        .unwrap();
    assert!(!absent);
}

#[tokio::test]
async fn test_refresh_capabilities_keeps_snapshot_when_unreachable() {
    let (network, alice, bob) = befriended().await;
    assert!(alice.actor.capabilities_stale(&bob.peer_id()).await.unwrap());

    let trust = alice.actor.refresh_capabilities(&bob.peer_id()).await.unwrap();
    assert_eq!(
        trust.capabilities.peer_protocol_version.as_deref(),
        Some(PROTOCOL_VERSION)
    );
    assert!(alice
        .actor
        .peer_supports(&bob.peer_id(), features::SUBSCRIPTION_RESYNC)
        .await
        .unwrap());
    assert!(!alice.actor.capabilities_stale(&bob.peer_id()).await.unwrap());

    network.set_unreachable(bob.actor.base_uri(), true).await;
    let unchanged = alice.actor.refresh_capabilities(&bob.peer_id()).await.unwrap();
    assert_eq!(unchanged.capabilities, trust.capabilities);
}

#[tokio::test]
async fn test_approval_survives_failed_notice() {
    let network = MemoryPeerNetwork::new();
    let alice = node(&network, "alice", ProtocolConfig::default()).await;
    let bob = node(&network, "bob", ProtocolConfig::default()).await;
    alice
        .actor
        .initiate_trust(bob.actor.base_uri(), "friend", "")
        .await
        .unwrap();

    network.set_unreachable(alice.actor.base_uri(), true).await;
    let err = bob.actor.approve_trust(&alice.peer_id()).await.unwrap_err();
    assert!(matches!(err, ProtocolError::PeerUnreachable(_)));
    assert!(bob
        .actor
        .get_trust(&alice.peer_id())
        .await
        .unwrap()
        .unwrap()
        .approved);
    assert_eq!(bob.events.approvals(ApprovalOrigin::Local), 1);

    network.set_unreachable(alice.actor.base_uri(), false).await;
    bob.actor.approve_trust(&alice.peer_id()).await.unwrap();
    assert_eq!(bob.events.approvals(ApprovalOrigin::Local), 1);
    assert_eq!(alice.events.approvals(ApprovalOrigin::Remote), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Deletion
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_delete_cascades() {
    let (_network, alice, bob) = befriended().await;
    let peer = alice.peer_id();

    let sub = bob
        .actor
        .create_subscription(&peer, &SubscriptionRequest::new("properties", Granularity::High))
        .await
        .unwrap();
    bob.actor
        .register_diff("properties", "status", "", Bytes::from_static(b"1"))
        .await
        .unwrap();
    bob.actor
        .set_permission_overrides(&peer, &RuleSet::new().with(AccessRule::deny("methods/*").unwrap()))
        .await
        .unwrap();
    let secret = bob.actor.get_trust(&peer).await.unwrap().unwrap().secret;

    assert!(bob.actor.delete_trust(&peer).await.unwrap());
    assert!(bob.actor.get_trust(&peer).await.unwrap().is_none());
    assert!(bob
        .actor
        .get_subscription(&peer, &sub.subscription_id)
        .await
        .unwrap()
        .is_none());
    assert!(bob.actor.permission_overrides(&peer).await.unwrap().is_none());
    assert!(matches!(
        bob.actor.authenticate(&secret).await,
        Err(ProtocolError::InvalidSecret)
    ));
    assert_eq!(
        bob.events
            .count(|e| matches!(e, ProtocolEvent::TrustDeleted { .. })),
        1
    );

    assert!(!bob.actor.delete_trust(&peer).await.unwrap());
}

#[tokio::test]
async fn test_oauth2_client_delete_revokes_credential() {
    let network = MemoryPeerNetwork::new();
    let registry = Arc::new(MemoryClientRegistry::new());
    registry.register_client("c-42").await;

    let identity = ActorIdentity::new(ActorId::new("owner").unwrap(), "https://owner.example/o")
        .unwrap();
    let transport: Arc<dyn PeerTransport> = network.clone();
    let actor = Actor::new(identity, MemoryStore::new(), transport, ProtocolConfig::default())
        .with_client_registry(registry.clone());

    let client = PeerId::oauth2_client("user@example.org", "c-42");
    let trust = actor
        .establish_client_trust(client.clone(), "mcp_client", ConnectionMethod::Mcp, "assistant")
        .await
        .unwrap();
    assert!(trust.is_fully_approved());
    assert_eq!(
        actor
            .evaluate(&client, "methods/search", Operation::Write)
            .await
            .unwrap(),
        Decision::Allowed
    );

    registry.set_unavailable(true);
    let err = actor.delete_trust(&client).await.unwrap_err();
    assert!(matches!(err, ProtocolError::ClientRegistry(_)));
    assert!(actor.get_trust(&client).await.unwrap().is_some());

    registry.set_unavailable(false);
    assert!(actor.delete_trust(&client).await.unwrap());
    assert!(!registry.contains("c-42").await);
    assert!(actor.get_trust(&client).await.unwrap().is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscriptions and Diffs
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_subscription_requires_full_approval_and_permission() {
    let network = MemoryPeerNetwork::new();
    let alice = node(&network, "alice", ProtocolConfig::default()).await;
    let bob = node(&network, "bob", ProtocolConfig::default()).await;
    let request = SubscriptionRequest::new("properties", Granularity::High);

    let err = bob
        .actor
        .create_subscription(&alice.peer_id(), &request)
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::NoSuchTrust(_)));

    alice
        .actor
        .initiate_trust(bob.actor.base_uri(), "friend", "")
        .await
        .unwrap();
    let err = bob
        .actor
        .create_subscription(&alice.peer_id(), &request)
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::PermissionDenied(_)));

    bob.actor.approve_trust(&alice.peer_id()).await.unwrap();
    let sub = bob
        .actor
        .create_subscription(&alice.peer_id(), &request)
        .await
        .unwrap();
    assert_eq!(sub.sequence_counter, 0);

    let err = bob
        .actor
        .create_subscription(
            &alice.peer_id(),
            &SubscriptionRequest::new("methods", Granularity::High),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::PermissionDenied(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_register_diff_assigns_contiguous_sequences() {
    let (_network, alice, bob) = befriended().await;
    let sub = bob
        .actor
        .create_subscription(
            &alice.peer_id(),
            &SubscriptionRequest::new("properties", Granularity::Low),
        )
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..32u8 {
        let actor = Arc::clone(&bob.actor);
        handles.push(tokio::spawn(async move {
            actor
                .register_diff("properties", "counter", "", Bytes::from(vec![i]))
                .await
                .unwrap()
        }));
    }

    let mut sequences = BTreeSet::new();
    for handle in handles {
        for registered in handle.await.unwrap() {
            assert!(sequences.insert(registered.diff.sequence));
        }
    }
    assert_eq!(sequences, (1..=32).collect::<BTreeSet<u64>>());

    let diffs = bob
        .actor
        .list_diffs(&alice.peer_id(), &sub.subscription_id, 0)
        .await
        .unwrap();
    let listed: Vec<u64> = diffs.iter().map(|d| d.sequence).collect();
    assert_eq!(listed, (1..=32).collect::<Vec<u64>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subscribe_racing_delete_leaves_no_orphans() {
    for _ in 0..50 {
        let (_network, alice, bob) = befriended().await;
        let peer = alice.peer_id();

        let subscribe = {
            let actor = Arc::clone(&bob.actor);
            let peer = peer.clone();
            tokio::spawn(async move {
                actor
                    .create_subscription(&peer, &SubscriptionRequest::new("properties", Granularity::Low))
                    .await
            })
        };
        let delete = {
            let actor = Arc::clone(&bob.actor);
            let peer = peer.clone();
            tokio::spawn(async move { actor.delete_trust(&peer).await })
        };

        match subscribe.await.unwrap() {
            Ok(_) | Err(ProtocolError::NoSuchTrust(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
        assert!(delete.await.unwrap().unwrap());

        assert!(bob.actor.get_trust(&peer).await.unwrap().is_none());
        assert!(bob.actor.list_subscriptions(Some(&peer)).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_clear_through_is_inclusive_and_idempotent() {
    let (_network, alice, bob) = befriended().await;
    let peer = alice.peer_id();
    let sub = bob
        .actor
        .create_subscription(&peer, &SubscriptionRequest::new("properties", Granularity::High))
        .await
        .unwrap();

    for i in 0..5u8 {
        bob.actor
            .register_diff("properties", "n", "", Bytes::from(vec![i]))
            .await
            .unwrap();
    }

    let id = &sub.subscription_id;
    assert_eq!(bob.actor.clear_diffs_through(&peer, id, 3).await.unwrap(), 3);
    assert_eq!(bob.actor.clear_diffs_through(&peer, id, 3).await.unwrap(), 0);

    let remaining: Vec<u64> = bob
        .actor
        .list_diffs(&peer, id, 0)
        .await
        .unwrap()
        .iter()
        .map(|d| d.sequence)
        .collect();
    assert_eq!(remaining, vec![4, 5]);

    let next = bob
        .actor
        .register_diff("properties", "n", "", Bytes::from_static(b"x"))
        .await
        .unwrap();
    assert_eq!(next[0].diff.sequence, 6);

    let from_five: Vec<u64> = bob
        .actor
        .list_diffs(&peer, id, 5)
        .await
        .unwrap()
        .iter()
        .map(|d| d.sequence)
        .collect();
    assert_eq!(from_five, vec![5, 6]);

    let err = bob
        .actor
        .list_diffs(&bob.peer_id(), id, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::NoSuchSubscription(_)));
}

#[tokio::test]
async fn test_matching_uses_wildcards() {
    let (_network, alice, bob) = befriended().await;
    let peer = alice.peer_id();
    let all = bob
        .actor
        .create_subscription(&peer, &SubscriptionRequest::new("properties", Granularity::High))
        .await
        .unwrap();
    let status = bob
        .actor
        .create_subscription(
            &peer,
            &SubscriptionRequest::new("properties", Granularity::High).subtarget("status"),
        )
        .await
        .unwrap();

    let registered = bob
        .actor
        .register_diff("properties", "color", "", Bytes::from_static(b"red"))
        .await
        .unwrap();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].subscription.subscription_id, all.subscription_id);

    let registered = bob
        .actor
        .register_diff("properties", "status", "", Bytes::from_static(b"on"))
        .await
        .unwrap();
    let ids: BTreeSet<_> = registered
        .iter()
        .map(|r| r.subscription.subscription_id.clone())
        .collect();
    assert!(ids.contains(&all.subscription_id));
    assert!(ids.contains(&status.subscription_id));

    assert!(bob
        .actor
        .register_diff("methods", "status", "", Bytes::from_static(b"x"))
        .await
        .unwrap()
        .is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Suspension
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_suspension_suppresses_and_resume_resyncs() {
    let (_network, alice, bob) = befriended().await;
    let peer = alice.peer_id();
    let bare = bob
        .actor
        .create_subscription(&peer, &SubscriptionRequest::new("properties", Granularity::High))
        .await
        .unwrap();
    let status = bob
        .actor
        .create_subscription(
            &peer,
            &SubscriptionRequest::new("properties", Granularity::High).subtarget("status"),
        )
        .await
        .unwrap();

    assert!(bob.actor.suspend("properties", None).await.unwrap());
    assert!(!bob.actor.suspend("properties", Some("")).await.unwrap());
    assert!(bob.actor.is_suspended("properties", None).await.unwrap());
    assert!(!bob.actor.is_suspended("properties", Some("status")).await.unwrap());

    let registered = bob
        .actor
        .register_diff("properties", "status", "", Bytes::from_static(b"paused"))
        .await
        .unwrap();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].subscription.subscription_id, status.subscription_id);
    assert!(bob
        .actor
        .list_diffs(&peer, &bare.subscription_id, 0)
        .await
        .unwrap()
        .is_empty());

    assert_eq!(bob.actor.resume("properties", None).await.unwrap(), 1);
    assert_eq!(bob.actor.resume("properties", None).await.unwrap(), 0);

    let diffs = bob
        .actor
        .list_diffs(&peer, &bare.subscription_id, 0)
        .await
        .unwrap();
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].sequence, 1);
    assert_eq!(diffs[0].body, DiffBody::Resync);
    assert_eq!(
        bob.events
            .count(|e| matches!(e, ProtocolEvent::ResyncIssued { .. })),
        1
    );
    assert!(bob.actor.list_suspended().await.unwrap().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Permissions
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_evaluation_fails_closed() {
    let network = MemoryPeerNetwork::new();
    let alice = node(&network, "alice", ProtocolConfig::default()).await;
    let bob = node(&network, "bob", ProtocolConfig::default()).await;

    let err = bob
        .actor
        .evaluate(&alice.peer_id(), "properties/x", Operation::Read)
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::NoSuchTrust(_)));

    alice
        .actor
        .initiate_trust(bob.actor.base_uri(), "friend", "")
        .await
        .unwrap();
    // Pending relationships get nothing.
    assert_eq!(
        bob.actor
            .evaluate(&alice.peer_id(), "properties/x", Operation::Read)
            .await
            .unwrap(),
        Decision::Denied
    );

    bob.actor.approve_trust(&alice.peer_id()).await.unwrap();
    let peer = alice.peer_id();
    assert_eq!(
        bob.actor.evaluate(&peer, "properties/x", Operation::Read).await.unwrap(),
        Decision::Allowed
    );
    assert_eq!(
        bob.actor.evaluate(&peer, "properties/x", Operation::Write).await.unwrap(),
        Decision::Denied
    );
    assert_eq!(
        bob.actor.evaluate(&peer, "trust/bob", Operation::Read).await.unwrap(),
        Decision::Denied
    );

    let visible = bob
        .actor
        .list_permitted(
            &peer,
            vec!["properties/a", "methods/b", "properties/c"],
            |p| p.to_string(),
            Operation::Read,
        )
        .await
        .unwrap();
    assert_eq!(visible, vec!["properties/a", "properties/c"]);
}

#[tokio::test]
async fn test_override_rules_take_precedence() {
    let (_network, alice, bob) = befriended().await;
    let peer = alice.peer_id();

    let rules = RuleSet::new()
        .with(AccessRule::allow("properties/*", [Operation::Write]).unwrap())
        .with(AccessRule::deny("properties/secret").unwrap());
    bob.actor.set_permission_overrides(&peer, &rules).await.unwrap();

    assert_eq!(
        bob.actor.evaluate(&peer, "properties/a", Operation::Write).await.unwrap(),
        Decision::Allowed
    );
    assert_eq!(
        bob.actor.evaluate(&peer, "properties/secret", Operation::Read).await.unwrap(),
        Decision::Denied
    );
    // Matching override without the operation denies, even though the
    // relationship default would allow it.
    assert_eq!(
        bob.actor.evaluate(&peer, "properties/a", Operation::Read).await.unwrap(),
        Decision::Denied
    );

    assert!(bob.actor.clear_permission_overrides(&peer).await.unwrap());
    assert_eq!(
        bob.actor.evaluate(&peer, "properties/a", Operation::Read).await.unwrap(),
        Decision::Allowed
    );

    let err = bob
        .actor
        .set_permission_overrides(&PeerId::simple("carol"), &rules)
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::NoSuchTrust(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Callbacks
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_callbacks_follow_granularity() {
    let (network, alice, bob) = befriended().await;
    let peer = alice.peer_id();
    bob.actor
        .create_subscription(
            &peer,
            &SubscriptionRequest::new("properties", Granularity::High)
                .subtarget("status")
                .with_callback(),
        )
        .await
        .unwrap();
    bob.actor
        .create_subscription(
            &peer,
            &SubscriptionRequest::new("properties", Granularity::None).with_callback(),
        )
        .await
        .unwrap();
    bob.actor
        .create_subscription(&peer, &SubscriptionRequest::new("properties", Granularity::Low))
        .await
        .unwrap();

    let registered = bob
        .actor
        .register_diff("properties", "status", "", Bytes::from_static(b"active"))
        .await
        .unwrap();
    assert_eq!(registered.len(), 3);

    let report = bob.actor.deliver_callbacks(&registered).await;
    assert!(report.is_complete());
    assert_eq!(report.delivered.len(), 2);
    assert_eq!(report.skipped, 1);

    let received: Vec<DiffNoticeBody> = alice
        .events
        .0
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            ProtocolEvent::DiffReceived { notice, .. } => Some(notice.body.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(received.len(), 2);
    assert!(received.contains(&DiffNoticeBody::Payload(Bytes::from_static(b"active"))));
    assert!(received.contains(&DiffNoticeBody::Trigger));

    network.set_unreachable(alice.actor.base_uri(), true).await;
    let registered = bob
        .actor
        .register_diff("properties", "status", "", Bytes::from_static(b"idle"))
        .await
        .unwrap();
    let report = bob.actor.deliver_callbacks(&registered).await;
    assert_eq!(report.failures.len(), 2);
    assert!(report
        .failures
        .iter()
        .all(|f| matches!(f.error, ProtocolError::PeerUnreachable(_))));
}

// ─────────────────────────────────────────────────────────────────────────────
// Worked Example
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_friend_subscription_walkthrough() {
    let (_network, b, a) = befriended().await;
    let peer_b = b.peer_id();

    let rules = RuleSet::new().with(AccessRule::deny("properties/secret").unwrap());
    a.actor.set_permission_overrides(&peer_b, &rules).await.unwrap();
    assert_eq!(
        a.actor.evaluate(&peer_b, "properties/secret", Operation::Read).await.unwrap(),
        Decision::Denied
    );
    assert_eq!(
        a.actor.evaluate(&peer_b, "properties/status", Operation::Subscribe).await.unwrap(),
        Decision::Allowed
    );

    let sub = a
        .actor
        .create_subscription(&peer_b, &SubscriptionRequest::new("properties", Granularity::High))
        .await
        .unwrap();
    let id = &sub.subscription_id;

    a.actor
        .register_diff("properties", "status", "", Bytes::from_static(br#"{"status":"active"}"#))
        .await
        .unwrap();
    let diffs = a.actor.list_diffs(&peer_b, id, 0).await.unwrap();
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].sequence, 1);
    assert_eq!(
        diffs[0].body,
        DiffBody::Delta(Bytes::from_static(br#"{"status":"active"}"#))
    );

    a.actor.suspend("properties", None).await.unwrap();
    let suppressed = a
        .actor
        .register_diff("properties", "status", "", Bytes::from_static(br#"{"status":"paused"}"#))
        .await
        .unwrap();
    assert!(suppressed.is_empty());

    assert_eq!(a.actor.resume("properties", None).await.unwrap(), 1);
    a.actor.clear_diffs_through(&peer_b, id, 1).await.unwrap();

    let diffs = a.actor.list_diffs(&peer_b, id, 0).await.unwrap();
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].sequence, 2);
    assert!(diffs[0].body.is_resync());
}

#[tokio::test]
async fn test_wildcard_feed_withholds_denied_paths() {
    let (_network, b, a) = befriended().await;
    let peer_b = b.peer_id();

    let rules = RuleSet::new().with(AccessRule::deny("properties/secret").unwrap());
    a.actor.set_permission_overrides(&peer_b, &rules).await.unwrap();

    let sub = a
        .actor
        .create_subscription(&peer_b, &SubscriptionRequest::new("properties", Granularity::High))
        .await
        .unwrap();
    let id = &sub.subscription_id;

    let withheld = a
        .actor
        .register_diff("properties", "secret", "", Bytes::from_static(b"hunter2"))
        .await
        .unwrap();
    assert!(withheld.is_empty());
    assert!(a.actor.list_diffs(&peer_b, id, 0).await.unwrap().is_empty());

    let visible = a
        .actor
        .register_diff("properties", "status", "", Bytes::from_static(b"active"))
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].diff.sequence, 1);

    a.actor.clear_permission_overrides(&peer_b).await.unwrap();
    a.actor
        .register_diff("properties", "secret", "", Bytes::from_static(b"rotated"))
        .await
        .unwrap();
    let bodies: Vec<DiffBody> = a
        .actor
        .list_diffs(&peer_b, id, 0)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.body)
        .collect();
    assert_eq!(
        bodies,
        vec![
            DiffBody::Delta(Bytes::from_static(b"active")),
            DiffBody::Delta(Bytes::from_static(b"rotated")),
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Persistence
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_feed_survives_restart_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("owner.db");
    let client = PeerId::oauth2_client("user@example.org", "c-1");
    let network = MemoryPeerNetwork::new();

    let open = |path: &std::path::Path| {
        let identity =
            ActorIdentity::new(ActorId::new("owner").unwrap(), "https://owner.example/o").unwrap();
        let transport: Arc<dyn PeerTransport> = network.clone();
        Actor::new(
            identity,
            SqliteStore::open(path).unwrap(),
            transport,
            ProtocolConfig::default(),
        )
    };

    let subscription_id = {
        let actor = open(&path);
        actor
            .establish_client_trust(client.clone(), "friend", ConnectionMethod::OAuth, "")
            .await
            .unwrap();
        let sub = actor
            .create_subscription(&client, &SubscriptionRequest::new("properties", Granularity::Low))
            .await
            .unwrap();
        actor
            .register_diff("properties", "a", "", Bytes::from_static(b"1"))
            .await
            .unwrap();
        actor.suspend("properties", None).await.unwrap();
        sub.subscription_id
    };

    let actor = open(&path);
    assert!(actor.is_suspended("properties", None).await.unwrap());
    assert_eq!(actor.resume("properties", None).await.unwrap(), 1);

    let diffs = actor.list_diffs(&client, &subscription_id, 0).await.unwrap();
    let sequences: Vec<u64> = diffs.iter().map(|d| d.sequence).collect();
    assert_eq!(sequences, vec![1, 2]);
    assert!(diffs[1].body.is_resync());
}
