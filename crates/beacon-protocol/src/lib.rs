//! # beacon-protocol — Visit Tracking Wire Contract
//!
//! Shared types and trait interfaces for the beacon tracking pipeline: the
//! update taxonomy the client sends, the session records the backend keeps,
//! and the ports at the client/backend boundary.
//!
//! It is intentionally dependency-light (no runtime deps like tokio, axum, or
//! reqwest) so it can be used as a pure contract crate.
//!
//! ## Module Overview
//!
//! - [`ids`] — Typed ID wrappers (SessionId, VideoId)
//! - [`update`] — CreateSession / SessionUpdate discriminated union
//! - [`session`] — SessionRecord and its field-merge semantics
//! - [`device`] — Best-effort device/referrer metadata
//! - [`ports`] — Boundary ports (transport, durable handle store, clock,
//!   device probe)
//! - [`error`] — TrackerError, TrackerResult

pub mod device;
pub mod error;
pub mod ids;
pub mod ports;
pub mod session;
pub mod update;

// Re-export the most commonly used types at the crate root.
pub use device::DeviceInfo;
pub use error::{TrackerError, TrackerResult};
pub use ids::{SessionId, VideoId};
pub use ports::{Clock, DeviceProbe, HandleStore, SessionTransport, StoredHandle};
pub use session::{CtaRecord, PageVisit, SessionRecord, VideoRecord};
pub use update::{
    CreateReply, CreateSession, CtaClass, CtaSource, SessionUpdate, UpdateBody, VideoKind,
};
