//! Boundary ports for the tracking pipeline.
//!
//! These traits are the only runtime boundary between the pipeline and its
//! collaborators: the session backend, the browser's durable per-origin
//! storage, the clock, and the device metadata probe.
//!
//! Object-safety note: async traits use `async-trait` for dyn-dispatch.

use crate::device::DeviceInfo;
use crate::error::TrackerResult;
use crate::ids::SessionId;
use crate::update::{CreateReply, CreateSession, SessionUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The session backend (`POST`/`PUT /sessions`).
#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn create(&self, request: CreateSession) -> TrackerResult<CreateReply>;
    async fn update(&self, update: SessionUpdate) -> TrackerResult<()>;

    /// Best-effort delivery for unload-time reports. Must return immediately;
    /// the send survives (or at least outlives) the caller's teardown and its
    /// outcome is never observed.
    fn send_final(&self, update: SessionUpdate);

    /// Identifier-less best-effort create, for visits abandoned before any
    /// resolution completed.
    fn create_final(&self, request: CreateSession);
}

/// Client-local session handle, persisted across navigations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredHandle {
    pub session_id: SessionId,
    pub last_refreshed_at: DateTime<Utc>,
}

/// Durable per-origin storage for the [`StoredHandle`].
///
/// Load/save/clear are infallible from the caller's perspective:
/// implementations log and swallow their own failures, and a failed load
/// reads as "no handle".
pub trait HandleStore: Send + Sync {
    fn load(&self) -> Option<StoredHandle>;
    fn save(&self, handle: &StoredHandle);
    fn clear(&self);
}

/// Wall-clock source, injectable for deterministic expiry tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Best-effort device/referrer metadata collection. Raced against a small
/// time budget by the resolver; a slow probe simply yields no metadata.
#[async_trait]
pub trait DeviceProbe: Send + Sync {
    async fn probe(&self) -> Option<DeviceInfo>;
}
