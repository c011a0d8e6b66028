//! Video playback milestones.
//!
//! Native `<video>` elements report start, periodic progress while playing,
//! and completion on natural end. Embedded players go through the adapter in
//! [`crate::embed`] and land on the same start/completion paths. Ownership of
//! "have I started tracking this video" lives here, keyed by [`VideoId`], so
//! a component-level handler and the passive page listener cannot both count
//! the same play.

use beacon_protocol::{UpdateBody, VideoId, VideoKind};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// DOM attribute a component sets on video elements it reports itself; the
/// passive listener skips elements carrying it.
pub const VIDEO_OPTOUT_ATTR: &str = "data-beacon-video-owned";

/// Cadence of progress reports while a video keeps playing.
pub const DEFAULT_VIDEO_PROGRESS_EVERY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct VideoState {
    title: String,
    kind: VideoKind,
    started: bool,
    watched_secs: u64,
    last_report_at: DateTime<Utc>,
}

/// Per-page video milestone tracker. Reset on navigation.
#[derive(Debug)]
pub struct VideoTracker {
    progress_every: TimeDelta,
    videos: HashMap<VideoId, VideoState>,
}

impl VideoTracker {
    pub fn new(progress_every: Duration) -> Self {
        Self {
            progress_every: TimeDelta::from_std(progress_every).unwrap_or_default(),
            videos: HashMap::new(),
        }
    }

    /// Playback began. Emits the zero-progress start event exactly once per
    /// logical video; a second start without an intervening end is dropped.
    pub fn started(
        &mut self,
        video_id: &VideoId,
        title: &str,
        kind: VideoKind,
        at: DateTime<Utc>,
    ) -> Option<UpdateBody> {
        let state = self.videos.entry(video_id.clone()).or_insert(VideoState {
            title: title.to_owned(),
            kind,
            started: false,
            watched_secs: 0,
            last_report_at: at,
        });
        if state.started {
            return None;
        }
        state.started = true;
        state.last_report_at = at;
        Some(UpdateBody::Video {
            video_id: video_id.clone(),
            title: state.title.clone(),
            kind: state.kind,
            watched_secs: 0,
            percent: 0,
        })
    }

    /// Playback position advanced. Emits at most one update per progress
    /// interval; ignored for videos that never reported a start.
    pub fn progress(
        &mut self,
        video_id: &VideoId,
        watched_secs: u64,
        percent: u8,
        at: DateTime<Utc>,
    ) -> Option<UpdateBody> {
        let state = self.videos.get_mut(video_id)?;
        if !state.started {
            return None;
        }
        state.watched_secs = state.watched_secs.max(watched_secs);
        if at - state.last_report_at < self.progress_every {
            return None;
        }
        state.last_report_at = at;
        Some(UpdateBody::Video {
            video_id: video_id.clone(),
            title: state.title.clone(),
            kind: state.kind,
            watched_secs: state.watched_secs,
            percent: percent.min(100),
        })
    }

    /// Natural end of playback: emits the 100% completion event and clears
    /// the started marker so a replay counts as a fresh start.
    pub fn ended(
        &mut self,
        video_id: &VideoId,
        watched_secs: u64,
        at: DateTime<Utc>,
    ) -> Option<UpdateBody> {
        let state = self.videos.get_mut(video_id)?;
        if !state.started {
            return None;
        }
        state.started = false;
        state.watched_secs = state.watched_secs.max(watched_secs);
        state.last_report_at = at;
        Some(UpdateBody::Video {
            video_id: video_id.clone(),
            title: state.title.clone(),
            kind: state.kind,
            watched_secs: state.watched_secs,
            percent: 100,
        })
    }

    /// Forget one video (element removed from the page).
    pub fn reset(&mut self, video_id: &VideoId) {
        self.videos.remove(video_id);
    }

    /// Forget everything (navigation).
    pub fn clear(&mut self) {
        self.videos.clear();
    }
}

impl Default for VideoTracker {
    fn default() -> Self {
        Self::new(DEFAULT_VIDEO_PROGRESS_EVERY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trailer() -> VideoId {
        VideoId::from_string("trailer-outbreak")
    }

    #[test]
    fn start_reports_once_per_logical_video() {
        let mut tracker = VideoTracker::default();
        let t0 = Utc::now();
        // Component handler and passive listener both observe the same play.
        let first = tracker.started(&trailer(), "Outbreak Trailer", VideoKind::Native, t0);
        let second = tracker.started(&trailer(), "Outbreak Trailer", VideoKind::Native, t0);
        assert!(matches!(
            first,
            Some(UpdateBody::Video {
                watched_secs: 0,
                percent: 0,
                ..
            })
        ));
        assert!(second.is_none());
    }

    #[test]
    fn progress_is_paced_to_the_interval() {
        let mut tracker = VideoTracker::default();
        let t0 = Utc::now();
        tracker.started(&trailer(), "Outbreak Trailer", VideoKind::Native, t0);
        assert!(
            tracker
                .progress(&trailer(), 4, 13, t0 + TimeDelta::seconds(4))
                .is_none()
        );
        let report = tracker.progress(&trailer(), 10, 33, t0 + TimeDelta::seconds(10));
        assert!(matches!(
            report,
            Some(UpdateBody::Video {
                watched_secs: 10,
                percent: 33,
                ..
            })
        ));
        // Next report only once another interval elapsed.
        assert!(
            tracker
                .progress(&trailer(), 14, 46, t0 + TimeDelta::seconds(14))
                .is_none()
        );
    }

    #[test]
    fn progress_without_start_is_ignored() {
        let mut tracker = VideoTracker::default();
        assert!(tracker.progress(&trailer(), 5, 20, Utc::now()).is_none());
        assert!(tracker.ended(&trailer(), 30, Utc::now()).is_none());
    }

    #[test]
    fn ended_reports_full_completion_and_allows_replay() {
        let mut tracker = VideoTracker::default();
        let t0 = Utc::now();
        tracker.started(&trailer(), "Outbreak Trailer", VideoKind::Native, t0);
        let ended = tracker.ended(&trailer(), 30, t0 + TimeDelta::seconds(30));
        assert!(matches!(
            ended,
            Some(UpdateBody::Video {
                watched_secs: 30,
                percent: 100,
                ..
            })
        ));
        // Replay after a natural end is a fresh start.
        let replay = tracker.started(
            &trailer(),
            "Outbreak Trailer",
            VideoKind::Native,
            t0 + TimeDelta::seconds(35),
        );
        assert!(replay.is_some());
    }

    #[test]
    fn pause_produces_no_event() {
        let mut tracker = VideoTracker::default();
        let t0 = Utc::now();
        tracker.started(&trailer(), "Outbreak Trailer", VideoKind::Native, t0);
        // A pause is simply the absence of further progress calls; watched
        // time already accumulated stays put.
        let after_pause = tracker.progress(&trailer(), 8, 26, t0 + TimeDelta::seconds(60));
        assert!(matches!(
            after_pause,
            Some(UpdateBody::Video { watched_secs: 8, .. })
        ));
    }
}
