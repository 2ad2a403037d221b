//! Test fixtures and helpers.
//!
//! Common setup code for multi-actor integration tests: actors on an
//! in-memory peer network, each recording the events it emits.

use std::sync::{Arc, Mutex, PoisonError};

use actorlink::core::{ActorId, PeerId};
use actorlink::peer::{DiffNotice, MemoryPeerNetwork, PeerEndpoint, PeerTransport};
use actorlink::store::MemoryStore;
use actorlink::{
    Actor, ActorIdentity, ApprovalOrigin, EventSink, ProtocolConfig, ProtocolEvent, Result,
};

/// An event sink that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProtocolEvent>>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, in order.
    pub fn events(&self) -> Vec<ProtocolEvent> {
        self.lock().clone()
    }

    /// Number of recorded events matching `pred`.
    pub fn count(&self, pred: impl Fn(&ProtocolEvent) -> bool) -> usize {
        self.lock().iter().filter(|e| pred(e)).count()
    }

    /// Number of full approvals from `origin`.
    pub fn approvals(&self, origin: ApprovalOrigin) -> usize {
        self.count(|e| {
            matches!(e, ProtocolEvent::TrustFullyApproved { origin: o, .. } if *o == origin)
        })
    }

    /// Diffs pushed to this actor, in arrival order.
    pub fn received_diffs(&self) -> Vec<DiffNotice> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                ProtocolEvent::DiffReceived { notice, .. } => Some(notice.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ProtocolEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: ProtocolEvent) {
        self.lock().push(event);
    }
}

/// An actor on a [`TestNetwork`] with its recorded events.
pub struct TestActor {
    pub actor: Arc<Actor<MemoryStore>>,
    pub events: Arc<RecordingSink>,
}

impl TestActor {
    /// How other actors name this one.
    pub fn peer_id(&self) -> PeerId {
        self.actor.id().as_peer()
    }

    /// Where this actor is reachable.
    pub fn base_uri(&self) -> &str {
        self.actor.base_uri()
    }
}

/// A set of actors that can reach each other.
pub struct TestNetwork {
    pub network: Arc<MemoryPeerNetwork>,
}

impl TestNetwork {
    /// Create an empty network.
    pub fn new() -> Self {
        Self {
            network: MemoryPeerNetwork::new(),
        }
    }

    /// The base uri an actor named `name` gets.
    pub fn base_uri_for(name: &str) -> String {
        format!("https://{name}.actors.test/{name}")
    }

    /// Start an actor named `name` and make it reachable.
    pub async fn spawn(&self, name: &str, config: ProtocolConfig) -> Result<TestActor> {
        let identity = ActorIdentity::new(ActorId::new(name)?, Self::base_uri_for(name))?;
        let events = Arc::new(RecordingSink::new());
        let transport: Arc<dyn PeerTransport> = self.network.clone();
        let actor = Arc::new(
            Actor::new(identity, MemoryStore::new(), transport, config)
                .with_event_sink(events.clone()),
        );

        let endpoint: Arc<dyn PeerEndpoint> = actor.clone();
        self.network.register(actor.base_uri(), &endpoint).await;
        Ok(TestActor { actor, events })
    }

    /// Start `count` actors named `actor0`, `actor1`, ... with default config.
    pub async fn spawn_many(&self, count: usize) -> Result<Vec<TestActor>> {
        let mut actors = Vec::with_capacity(count);
        for i in 0..count {
            actors.push(self.spawn(&format!("actor{i}"), ProtocolConfig::default()).await?);
        }
        Ok(actors)
    }

    /// Run the full handshake: `initiator` asks, `recipient` approves.
    pub async fn befriend(
        &self,
        initiator: &TestActor,
        recipient: &TestActor,
        relationship_type: &str,
    ) -> Result<()> {
        initiator
            .actor
            .initiate_trust(recipient.base_uri(), relationship_type, "")
            .await?;
        recipient.actor.approve_trust(&initiator.peer_id()).await?;
        Ok(())
    }
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// Route `tracing` output to the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
