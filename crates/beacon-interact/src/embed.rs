//! Inbound adapter for embedded (iframe) video players.
//!
//! Embedded players announce state over a cross-origin messaging channel.
//! This adapter translates the provider's message shape into the internal
//! `{video_id, state}` form consumed by [`crate::VideoTracker`], keeping the
//! provider-specific parsing isolated and swappable. Anything unknown or
//! unparseable is ignored silently.

use beacon_protocol::VideoId;
use serde_json::Value;

/// Player states the pipeline reacts to. Everything else (paused, buffering,
/// cued) is deliberately not represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Playing,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerStateChange {
    pub video_id: VideoId,
    pub state: PlayerState,
}

// YouTube iframe API state codes.
const STATE_ENDED: i64 = 0;
const STATE_PLAYING: i64 = 1;

/// Parse one raw `postMessage` payload from an embedded player.
pub fn parse_player_message(raw: &str) -> Option<PlayerStateChange> {
    let message: Value = serde_json::from_str(raw).ok()?;
    if message.get("event")?.as_str()? != "onStateChange" {
        return None;
    }
    let state = match message.get("info")?.as_i64()? {
        STATE_PLAYING => PlayerState::Playing,
        STATE_ENDED => PlayerState::Ended,
        _ => return None,
    };
    let video_id = match message.get("id") {
        Some(Value::String(id)) => VideoId::from_string(id.clone()),
        Some(Value::Number(id)) => VideoId::from_string(format!("embed-{id}")),
        _ => VideoId::from_string("embed"),
    };
    Some(PlayerStateChange { video_id, state })
}
