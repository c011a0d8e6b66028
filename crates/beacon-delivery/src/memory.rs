//! In-memory transport: the backend contract over a process-local map.
//!
//! Mirrors the production backend's in-memory store, including its one
//! notable property: state vanishes on restart ([`MemoryTransport::wipe`]),
//! which is exactly the failure the recreation path exists for. Every call
//! is logged in order, which is what scenario tests assert against.

use beacon_protocol::{
    CreateReply, CreateSession, SessionId, SessionRecord, SessionTransport, SessionUpdate,
    TrackerError, TrackerResult,
};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;

/// One observed transport invocation, in arrival order.
#[derive(Debug, Clone)]
pub enum TransportCall {
    Create(CreateSession),
    Update(SessionUpdate),
    FinalUpdate(SessionUpdate),
    FinalCreate(CreateSession),
}

#[derive(Debug, Default)]
struct MemoryState {
    sessions: HashMap<SessionId, SessionRecord>,
    log: Vec<TransportCall>,
}

#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

impl MemoryTransport {
    /// Simulate a backend restart: all session state is lost, the call log
    /// survives (it belongs to the observer, not the backend).
    pub fn wipe(&self) {
        self.state.lock().sessions.clear();
    }

    pub fn record(&self, id: &SessionId) -> Option<SessionRecord> {
        self.state.lock().sessions.get(id).cloned()
    }

    pub fn records(&self) -> Vec<SessionRecord> {
        self.state.lock().sessions.values().cloned().collect()
    }

    pub fn log(&self) -> Vec<TransportCall> {
        self.state.lock().log.clone()
    }

    fn insert(state: &mut MemoryState, request: &CreateSession) -> CreateReply {
        let id = SessionId::new_uuid();
        let record = SessionRecord::new(id.clone(), request, Utc::now());
        state.sessions.insert(id.clone(), record);
        CreateReply {
            id,
            count: state.sessions.len() as u64,
        }
    }

    fn fold(state: &mut MemoryState, update: &SessionUpdate) -> TrackerResult<()> {
        match state.sessions.get_mut(&update.id) {
            Some(record) => {
                record.apply(&update.body, Utc::now());
                Ok(())
            }
            None => Err(TrackerError::UnknownSession),
        }
    }
}

#[async_trait::async_trait]
impl SessionTransport for MemoryTransport {
    async fn create(&self, request: CreateSession) -> TrackerResult<CreateReply> {
        let mut state = self.state.lock();
        state.log.push(TransportCall::Create(request.clone()));
        Ok(Self::insert(&mut state, &request))
    }

    async fn update(&self, update: SessionUpdate) -> TrackerResult<()> {
        let mut state = self.state.lock();
        state.log.push(TransportCall::Update(update.clone()));
        Self::fold(&mut state, &update)
    }

    fn send_final(&self, update: SessionUpdate) {
        let mut state = self.state.lock();
        state.log.push(TransportCall::FinalUpdate(update.clone()));
        // Best-effort: an unknown identifier is dropped on the floor, same
        // as a beacon landing after the backend restarted.
        let _ = Self::fold(&mut state, &update);
    }

    fn create_final(&self, request: CreateSession) {
        let mut state = self.state.lock();
        state.log.push(TransportCall::FinalCreate(request.clone()));
        Self::insert(&mut state, &request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_protocol::UpdateBody;

    #[tokio::test]
    async fn unknown_identifier_is_rejected() {
        let transport = MemoryTransport::default();
        let result = transport
            .update(SessionUpdate::new(
                SessionId::from_string("ghost"),
                UpdateBody::Heartbeat,
            ))
            .await;
        assert!(matches!(result, Err(TrackerError::UnknownSession)));
    }

    #[tokio::test]
    async fn wipe_forgets_sessions_but_not_the_log() {
        let transport = MemoryTransport::default();
        let reply = transport.create(CreateSession::at_path("/")).await.unwrap();
        assert_eq!(reply.count, 1);
        transport.wipe();
        assert!(transport.record(&reply.id).is_none());
        assert_eq!(transport.log().len(), 1);
    }
}
