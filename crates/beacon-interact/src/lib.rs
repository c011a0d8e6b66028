//! Interaction recording: call-to-action clicks and video milestones.
//!
//! Two capture paths feed this crate. Components may instrument their own
//! elements (explicit path) and stamp the exported opt-out markers so the
//! page-wide fallback listener skips them; everything else falls through to
//! the passive path. Both paths converge on the same dedup state, so one
//! physical interaction is never reported twice.

pub mod cta;
pub mod embed;
pub mod video;

pub use cta::{
    BOOKING_MARKER_CLASS, CLICK_OPTOUT_ATTR, ClickEvent, CtaDeduper, CtaRules, classify,
};
pub use embed::{PlayerState, PlayerStateChange, parse_player_message};
pub use video::{VIDEO_OPTOUT_ATTR, VideoTracker};
