//! Outbound update taxonomy.
//!
//! `PUT /sessions` carries a discriminated union keyed by a `"type"` tag plus
//! the session identifier; `POST /sessions` creates a session. Field names
//! follow the backend's camelCase contract.

use crate::device::DeviceInfo;
use crate::ids::{SessionId, VideoId};
use serde::{Deserialize, Serialize};

/// Body of `POST /sessions`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSession {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
    /// Set from birth when the visitor left before the page finished loading
    /// and no session existed yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_before_load: Option<bool>,
}

impl CreateSession {
    pub fn at_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Reply to `POST /sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReply {
    pub id: SessionId,
    /// Total sessions the backend currently holds.
    pub count: u64,
}

/// Body of `PUT /sessions`: one event attributed to an existing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub id: SessionId,
    #[serde(flatten)]
    pub body: UpdateBody,
}

impl SessionUpdate {
    pub fn new(id: SessionId, body: UpdateBody) -> Self {
        Self { id, body }
    }
}

/// Discriminated union of everything the client reports about a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum UpdateBody {
    /// Keep-alive; only refreshes `lastSeenAt`.
    Heartbeat,
    /// Navigation to a new path. Closes the previous page visit and opens the
    /// next one.
    Page { path: String },
    /// Coalesced scroll/engagement progress for the current page visit.
    /// `closing` marks the final snapshot emitted when the visit ends.
    Scroll {
        path: String,
        depth_percent: u8,
        active_ms: u64,
        closing: bool,
    },
    /// A classified call-to-action click.
    Cta {
        source: CtaSource,
        label: String,
        class: CtaClass,
        target_url: String,
    },
    /// Playback progress for one logical video. The backend updates the
    /// matching record in place rather than appending.
    Video {
        video_id: VideoId,
        title: String,
        kind: VideoKind,
        watched_secs: u64,
        percent: u8,
    },
    /// Status change on the session itself.
    Status { left_before_load: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CtaClass {
    Booking,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CtaSource {
    /// Reported by the owning component, which opted out of passive capture.
    Explicit,
    /// Captured by the page-wide fallback listener.
    Passive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoKind {
    Embedded,
    Native,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_body_tag_is_lowercase() {
        let update = SessionUpdate::new(
            SessionId::from_string("S1"),
            UpdateBody::Scroll {
                path: "/games/outbreak".into(),
                depth_percent: 73,
                active_ms: 8000,
                closing: false,
            },
        );
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["type"], "scroll");
        assert_eq!(json["id"], "S1");
        assert_eq!(json["depthPercent"], 73);
        assert_eq!(json["activeMs"], 8000);
    }

    #[test]
    fn create_session_omits_empty_optionals() {
        let json = serde_json::to_value(CreateSession::at_path("/")).unwrap();
        assert!(json.get("deviceInfo").is_none());
        assert!(json.get("leftBeforeLoad").is_none());
    }

    #[test]
    fn cta_update_roundtrip() {
        let body = UpdateBody::Cta {
            source: CtaSource::Passive,
            label: "BOOK FAR CRY VR".into(),
            class: CtaClass::Booking,
            target_url: "https://booking.example.com/far-cry".into(),
        };
        let update = SessionUpdate::new(SessionId::from_string("S2"), body.clone());
        let json = serde_json::to_string(&update).unwrap();
        let back: SessionUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(back.body, body);
    }

    #[test]
    fn status_update_wire_shape() {
        let json = serde_json::to_value(SessionUpdate::new(
            SessionId::from_string("S3"),
            UpdateBody::Status {
                left_before_load: true,
            },
        ))
        .unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["leftBeforeLoad"], true);
    }
}
