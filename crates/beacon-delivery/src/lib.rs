//! Update delivery.
//!
//! [`DeliveryCoordinator`] sits between the observers and the transport:
//! every reliable update waits for session resolution first (updates raised
//! before resolution completes queue behind it, they are not dropped), and a
//! backend rejection that marks the local session stale triggers recreation
//! plus exactly one retry against the new identifier. Final (unload-time)
//! sends bypass all of that and go straight to the fire-and-forget path.

use beacon_identity::SessionResolver;
use beacon_protocol::{CreateSession, SessionTransport, SessionUpdate, UpdateBody};
use std::sync::Arc;
use tracing::{debug, warn};

mod http;
mod memory;

pub use http::HttpTransport;
pub use memory::{MemoryTransport, TransportCall};

#[derive(Clone)]
pub struct DeliveryCoordinator {
    transport: Arc<dyn SessionTransport>,
    resolver: SessionResolver,
}

impl DeliveryCoordinator {
    pub fn new(transport: Arc<dyn SessionTransport>, resolver: SessionResolver) -> Self {
        Self {
            transport,
            resolver,
        }
    }

    pub fn resolver(&self) -> &SessionResolver {
        &self.resolver
    }

    /// Reliable delivery. Returns whether the backend accepted the update
    /// (possibly after one session recreation).
    pub async fn deliver(&self, path: &str, body: UpdateBody) -> bool {
        let Some(id) = self.resolver.resolve(path).await else {
            debug!("no session; dropping update");
            return false;
        };
        match self
            .transport
            .update(SessionUpdate::new(id, body.clone()))
            .await
        {
            Ok(()) => true,
            Err(error) if error.is_stale() => {
                debug!(%error, "session stale; recreating");
                self.resolver.invalidate();
                let Some(new_id) = self.resolver.resolve(path).await else {
                    return false;
                };
                match self.transport.update(SessionUpdate::new(new_id, body)).await {
                    Ok(()) => true,
                    Err(error) => {
                        warn!(%error, "retry after recreation failed");
                        false
                    }
                }
            }
            Err(error) => {
                warn!(%error, "update delivery failed");
                false
            }
        }
    }

    /// Fire-and-forget delivery for unload-time reports. Needs an already
    /// resolved identifier; returns whether a send was handed off.
    pub fn deliver_final(&self, body: UpdateBody) -> bool {
        let Some(id) = self.resolver.current() else {
            debug!("no session; dropping final update");
            return false;
        };
        self.transport.send_final(SessionUpdate::new(id, body));
        true
    }

    /// Identifier-less fire-and-forget create (abandonment before any
    /// resolution completed).
    pub fn create_final(&self, request: CreateSession) {
        self.transport.create_final(request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_identity::{
        DEFAULT_PROBE_BUDGET, DEFAULT_SESSION_TTL, MemoryHandleStore, NoDeviceProbe, SystemClock,
    };
    use beacon_protocol::SessionId;

    fn coordinator(transport: Arc<MemoryTransport>) -> DeliveryCoordinator {
        let resolver = SessionResolver::new(
            transport.clone(),
            Arc::new(MemoryHandleStore::default()),
            Arc::new(SystemClock),
            Arc::new(NoDeviceProbe),
            DEFAULT_SESSION_TTL,
            DEFAULT_PROBE_BUDGET,
        );
        DeliveryCoordinator::new(transport, resolver)
    }

    #[tokio::test]
    async fn updates_queue_behind_resolution_then_deliver() {
        let transport = Arc::new(MemoryTransport::default());
        let coordinator = coordinator(transport.clone());
        assert!(coordinator.deliver("/games", UpdateBody::Heartbeat).await);
        let log = transport.log();
        assert!(matches!(log[0], TransportCall::Create(_)));
        assert!(matches!(log[1], TransportCall::Update(_)));
    }

    #[tokio::test]
    async fn wiped_backend_triggers_recreate_and_single_retry() {
        let transport = Arc::new(MemoryTransport::default());
        let coordinator = coordinator(transport.clone());
        let first = coordinator.resolver().resolve("/").await.unwrap();

        // Backend restart: every stored session is gone.
        transport.wipe();
        assert!(coordinator.deliver("/", UpdateBody::Heartbeat).await);

        let second = coordinator.resolver().current().unwrap();
        assert_ne!(first, second);
        let log = transport.log();
        // Rejected update, then create, then exactly one retried update
        // bearing the new identifier.
        let tail: Vec<_> = log.iter().skip(1).collect();
        assert!(
            matches!(&tail[..], [
                TransportCall::Update(rejected),
                TransportCall::Create(_),
                TransportCall::Update(retried),
            ] if rejected.id == first && retried.id == second)
        );
        assert!(transport.record(&second).is_some());
    }

    #[tokio::test]
    async fn deliver_final_without_identifier_is_dropped() {
        let transport = Arc::new(MemoryTransport::default());
        let coordinator = coordinator(transport.clone());
        assert!(!coordinator.deliver_final(UpdateBody::Heartbeat));
        assert!(transport.log().is_empty());
    }

    #[tokio::test]
    async fn deliver_final_uses_the_fire_and_forget_path() {
        let transport = Arc::new(MemoryTransport::default());
        let coordinator = coordinator(transport.clone());
        let id = coordinator.resolver().resolve("/").await.unwrap();
        assert!(coordinator.deliver_final(UpdateBody::Status {
            left_before_load: true,
        }));
        assert!(matches!(
            transport.log().last(),
            Some(TransportCall::FinalUpdate(update)) if update.id == id
        ));
        assert!(transport.record(&id).unwrap().left_before_load);
    }

    #[tokio::test]
    async fn identifierless_create_final_is_born_abandoned() {
        let transport = Arc::new(MemoryTransport::default());
        let coordinator = coordinator(transport.clone());
        coordinator.create_final(CreateSession {
            path: "/games/outbreak".into(),
            device_info: None,
            left_before_load: Some(true),
        });
        let records = transport.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].left_before_load);
        assert_eq!(records[0].current_path, "/games/outbreak");
    }

    #[tokio::test]
    async fn malformed_rejection_is_treated_like_a_stale_session() {
        use beacon_protocol::{CreateReply, TrackerError, TrackerResult};
        use parking_lot::Mutex;
        use std::sync::atomic::{AtomicUsize, Ordering};

        /// Rejects the first update as malformed, accepts afterwards.
        struct RejectOnceTransport {
            updates: AtomicUsize,
            creates: AtomicUsize,
            accepted: Mutex<Vec<SessionId>>,
        }

        #[async_trait::async_trait]
        impl SessionTransport for RejectOnceTransport {
            async fn create(&self, _request: CreateSession) -> TrackerResult<CreateReply> {
                let serial = self.creates.fetch_add(1, Ordering::SeqCst);
                Ok(CreateReply {
                    id: SessionId::from_string(format!("session-{serial}")),
                    count: serial as u64 + 1,
                })
            }

            async fn update(&self, update: SessionUpdate) -> TrackerResult<()> {
                if self.updates.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(TrackerError::Rejected("missing field".into()));
                }
                self.accepted.lock().push(update.id);
                Ok(())
            }

            fn send_final(&self, _update: SessionUpdate) {}

            fn create_final(&self, _request: CreateSession) {}
        }

        let transport = Arc::new(RejectOnceTransport {
            updates: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
            accepted: Mutex::new(Vec::new()),
        });
        let resolver = SessionResolver::new(
            transport.clone(),
            Arc::new(MemoryHandleStore::default()),
            Arc::new(SystemClock),
            Arc::new(NoDeviceProbe),
            DEFAULT_SESSION_TTL,
            DEFAULT_PROBE_BUDGET,
        );
        let coordinator = DeliveryCoordinator::new(transport.clone(), resolver);

        assert!(coordinator.deliver("/", UpdateBody::Heartbeat).await);
        assert_eq!(transport.creates.load(Ordering::SeqCst), 2);
        assert_eq!(
            transport.accepted.lock().as_slice(),
            &[SessionId::from_string("session-1")]
        );
    }
}
