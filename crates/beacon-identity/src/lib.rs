//! Session identity management.
//!
//! [`SessionResolver`] owns the client-local session handle: it resolves the
//! identifier once and hands it to every observer, persists it across
//! navigations, expires it after 30 minutes of inactivity, and recreates it
//! when the backend stops recognizing it. Resolution is single-flight: any
//! number of concurrent callers produce at most one create request, with the
//! rest awaiting the same outcome.

use std::sync::Arc;
use std::time::Duration;

use beacon_protocol::{
    Clock, CreateSession, DeviceProbe, HandleStore, SessionId, SessionTransport, StoredHandle,
};
use chrono::TimeDelta;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

mod clock;
mod probe;
mod store;

pub use clock::SystemClock;
pub use probe::{NoDeviceProbe, StaticDeviceProbe, fingerprint};
pub use store::{FileHandleStore, MemoryHandleStore};

/// Inactivity window after which a stored identifier is discarded.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);
/// How long the create request waits for device metadata before going out
/// without it.
pub const DEFAULT_PROBE_BUDGET: Duration = Duration::from_millis(25);

struct ResolverInner {
    transport: Arc<dyn SessionTransport>,
    store: Arc<dyn HandleStore>,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn DeviceProbe>,
    ttl: TimeDelta,
    probe_budget: Duration,
    /// The resolved identifier, readable without awaiting.
    current: Mutex<Option<SessionId>>,
    /// Held for the duration of one resolution; queued callers adopt the
    /// winner's outcome instead of issuing their own create.
    resolving: tokio::sync::Mutex<()>,
}

/// Resolves and owns the per-browser session identifier.
#[derive(Clone)]
pub struct SessionResolver {
    inner: Arc<ResolverInner>,
}

impl SessionResolver {
    pub fn new(
        transport: Arc<dyn SessionTransport>,
        store: Arc<dyn HandleStore>,
        clock: Arc<dyn Clock>,
        probe: Arc<dyn DeviceProbe>,
        ttl: Duration,
        probe_budget: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                transport,
                store,
                clock,
                probe,
                ttl: TimeDelta::from_std(ttl).unwrap_or_default(),
                probe_budget,
                current: Mutex::new(None),
                resolving: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// The identifier resolved so far, if any. Never blocks.
    pub fn current(&self) -> Option<SessionId> {
        self.inner.current.lock().clone()
    }

    /// Resolve the session identifier: in-memory, then the durable handle if
    /// still within the inactivity window, then a backend create. Returns
    /// `None` when creation failed; that is recoverable and callers may
    /// retry on their next cycle.
    pub async fn resolve(&self, path: &str) -> Option<SessionId> {
        if let Some(id) = self.current() {
            return Some(id);
        }

        let _flight = self.inner.resolving.lock().await;
        // A queued caller lands here after the winner finished.
        if let Some(id) = self.current() {
            return Some(id);
        }

        let now = self.inner.clock.now();
        if let Some(handle) = self.inner.store.load() {
            if now - handle.last_refreshed_at <= self.inner.ttl {
                debug!(session_id = %handle.session_id, "adopted stored session");
                *self.inner.current.lock() = Some(handle.session_id.clone());
                self.inner.store.save(&StoredHandle {
                    session_id: handle.session_id.clone(),
                    last_refreshed_at: now,
                });
                return Some(handle.session_id);
            }
            debug!(session_id = %handle.session_id, "stored session expired");
            self.inner.store.clear();
        }

        // Metadata collection is best-effort and bounded; the create goes
        // out without it rather than waiting.
        let device_info = tokio::time::timeout(self.inner.probe_budget, self.inner.probe.probe())
            .await
            .ok()
            .flatten();

        let request = CreateSession {
            path: path.to_owned(),
            device_info,
            left_before_load: None,
        };
        match self.inner.transport.create(request).await {
            Ok(reply) => {
                info!(session_id = %reply.id, count = reply.count, "session created");
                *self.inner.current.lock() = Some(reply.id.clone());
                self.inner.store.save(&StoredHandle {
                    session_id: reply.id.clone(),
                    last_refreshed_at: self.inner.clock.now(),
                });
                Some(reply.id)
            }
            Err(error) => {
                warn!(%error, "session create failed");
                None
            }
        }
    }

    /// Wait for any in-flight resolution to finish, then report the outcome.
    /// Does not start a resolution of its own.
    pub async fn settled(&self) -> Option<SessionId> {
        let _flight = self.inner.resolving.lock().await;
        self.current()
    }

    /// Discard all local identity state. The next [`resolve`](Self::resolve)
    /// recreates the session from scratch.
    pub fn invalidate(&self) {
        debug!("session invalidated");
        *self.inner.current.lock() = None;
        self.inner.store.clear();
    }

    /// Push the inactivity window forward (called when the backend accepted
    /// a heartbeat).
    pub fn refresh(&self) {
        if let Some(session_id) = self.current() {
            self.inner.store.save(&StoredHandle {
                session_id,
                last_refreshed_at: self.inner.clock.now(),
            });
        }
    }
}
