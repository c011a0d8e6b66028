//! Backend-side session records and their merge semantics.
//!
//! Updates are last-write-wins at the field level except where a field is
//! monotone: depth, durations, and completion percent merge as `max`, the
//! abandonment flag merges as `or`, and ordered sequences append. That makes
//! throttled updates commutative, so out-of-order delivery (a coalesced
//! scroll update arriving after the closing one) cannot regress a record.

use crate::device::DeviceInfo;
use crate::ids::{SessionId, VideoId};
use crate::update::{CreateSession, CtaClass, CtaSource, UpdateBody, VideoKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One visitor's anonymous activity record, keyed by [`SessionId`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub current_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
    /// Ordered page visits; the last entry stays open until a navigation or a
    /// closing scroll snapshot stamps its exit time.
    #[serde(default)]
    pub pages: Vec<PageVisit>,
    #[serde(default)]
    pub cta_events: Vec<CtaRecord>,
    #[serde(default)]
    pub video_events: Vec<VideoRecord>,
    /// Set at most once; true when the visitor departed before the page load
    /// threshold was reached.
    #[serde(default)]
    pub left_before_load: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageVisit {
    pub path: String,
    pub entered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exited_at: Option<DateTime<Utc>>,
    pub max_depth_percent: u8,
    pub active_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtaRecord {
    pub at: DateTime<Utc>,
    pub source: CtaSource,
    pub label: String,
    pub class: CtaClass,
    pub target_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub at: DateTime<Utc>,
    pub video_id: VideoId,
    pub title: String,
    pub kind: VideoKind,
    pub watched_secs: u64,
    pub percent: u8,
}

impl SessionRecord {
    /// Fresh record for a just-created session.
    pub fn new(id: SessionId, request: &CreateSession, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: now,
            last_seen_at: now,
            current_path: request.path.clone(),
            device_info: request.device_info.clone(),
            pages: Vec::new(),
            cta_events: Vec::new(),
            video_events: Vec::new(),
            left_before_load: request.left_before_load.unwrap_or(false),
        }
    }

    /// Fold one accepted update into the record.
    pub fn apply(&mut self, body: &UpdateBody, now: DateTime<Utc>) {
        self.last_seen_at = self.last_seen_at.max(now);
        match body {
            UpdateBody::Heartbeat => {}
            UpdateBody::Page { path } => {
                self.close_open_page(now);
                self.pages.push(PageVisit {
                    path: path.clone(),
                    entered_at: now,
                    exited_at: None,
                    max_depth_percent: 0,
                    active_ms: 0,
                });
                self.current_path = path.clone();
            }
            UpdateBody::Scroll {
                path,
                depth_percent,
                active_ms,
                closing,
            } => {
                let visit = self.visit_for_path(path, now);
                visit.max_depth_percent = visit.max_depth_percent.max(*depth_percent);
                visit.active_ms = visit.active_ms.max(*active_ms);
                if *closing && visit.exited_at.is_none() {
                    visit.exited_at = Some(now);
                }
            }
            UpdateBody::Cta {
                source,
                label,
                class,
                target_url,
            } => {
                self.cta_events.push(CtaRecord {
                    at: now,
                    source: *source,
                    label: label.clone(),
                    class: *class,
                    target_url: target_url.clone(),
                });
            }
            UpdateBody::Video {
                video_id,
                title,
                kind,
                watched_secs,
                percent,
            } => {
                match self
                    .video_events
                    .iter_mut()
                    .find(|record| record.video_id == *video_id)
                {
                    Some(record) => {
                        record.watched_secs = record.watched_secs.max(*watched_secs);
                        record.percent = record.percent.max(*percent);
                    }
                    None => self.video_events.push(VideoRecord {
                        at: now,
                        video_id: video_id.clone(),
                        title: title.clone(),
                        kind: *kind,
                        watched_secs: *watched_secs,
                        percent: *percent,
                    }),
                }
            }
            UpdateBody::Status { left_before_load } => {
                self.left_before_load |= *left_before_load;
            }
        }
    }

    fn close_open_page(&mut self, now: DateTime<Utc>) {
        if let Some(open) = self.pages.last_mut()
            && open.exited_at.is_none()
        {
            open.exited_at = Some(now);
        }
    }

    fn visit_for_path(&mut self, path: &str, now: DateTime<Utc>) -> &mut PageVisit {
        let needs_new = self
            .pages
            .last()
            .map(|visit| visit.path != path)
            .unwrap_or(true);
        if needs_new {
            self.pages.push(PageVisit {
                path: path.to_owned(),
                entered_at: now,
                exited_at: None,
                max_depth_percent: 0,
                active_ms: 0,
            });
            self.current_path = path.to_owned();
        }
        // A visit exists after the push above.
        self.pages.last_mut().expect("open page visit")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn record() -> SessionRecord {
        SessionRecord::new(
            SessionId::from_string("S1"),
            &CreateSession::at_path("/"),
            Utc::now(),
        )
    }

    #[test]
    fn page_update_closes_previous_visit() {
        let mut record = record();
        let t0 = Utc::now();
        record.apply(
            &UpdateBody::Page {
                path: "/games".into(),
            },
            t0,
        );
        record.apply(
            &UpdateBody::Page {
                path: "/games/outbreak".into(),
            },
            t0 + TimeDelta::seconds(5),
        );
        assert_eq!(record.pages.len(), 2);
        assert!(record.pages[0].exited_at.is_some());
        assert!(record.pages[1].exited_at.is_none());
        assert_eq!(record.current_path, "/games/outbreak");
    }

    #[test]
    fn scroll_depth_merges_as_max() {
        let mut record = record();
        let now = Utc::now();
        record.apply(
            &UpdateBody::Page {
                path: "/games".into(),
            },
            now,
        );
        for (depth, active) in [(40_u8, 2000_u64), (73, 8000), (55, 6000)] {
            record.apply(
                &UpdateBody::Scroll {
                    path: "/games".into(),
                    depth_percent: depth,
                    active_ms: active,
                    closing: false,
                },
                now,
            );
        }
        assert_eq!(record.pages[0].max_depth_percent, 73);
        assert_eq!(record.pages[0].active_ms, 8000);
    }

    #[test]
    fn late_scroll_after_closing_snapshot_cannot_regress() {
        let mut record = record();
        let now = Utc::now();
        record.apply(
            &UpdateBody::Page {
                path: "/games".into(),
            },
            now,
        );
        record.apply(
            &UpdateBody::Scroll {
                path: "/games".into(),
                depth_percent: 73,
                active_ms: 8000,
                closing: true,
            },
            now,
        );
        let exited = record.pages[0].exited_at;
        // A throttled update delayed by network jitter lands afterwards.
        record.apply(
            &UpdateBody::Scroll {
                path: "/games".into(),
                depth_percent: 60,
                active_ms: 7000,
                closing: false,
            },
            now + TimeDelta::seconds(1),
        );
        assert_eq!(record.pages.len(), 1);
        assert_eq!(record.pages[0].max_depth_percent, 73);
        assert_eq!(record.pages[0].exited_at, exited);
    }

    #[test]
    fn video_updates_in_place_by_id() {
        let mut record = record();
        let now = Utc::now();
        let play = |watched: u64, percent: u8| UpdateBody::Video {
            video_id: VideoId::from_string("trailer"),
            title: "Outbreak Trailer".into(),
            kind: VideoKind::Native,
            watched_secs: watched,
            percent,
        };
        record.apply(&play(0, 0), now);
        record.apply(&play(10, 33), now);
        record.apply(&play(30, 100), now);
        assert_eq!(record.video_events.len(), 1);
        assert_eq!(record.video_events[0].watched_secs, 30);
        assert_eq!(record.video_events[0].percent, 100);
    }

    #[test]
    fn abandonment_flag_sets_at_most_once() {
        let mut record = record();
        let now = Utc::now();
        record.apply(
            &UpdateBody::Status {
                left_before_load: true,
            },
            now,
        );
        record.apply(
            &UpdateBody::Status {
                left_before_load: false,
            },
            now,
        );
        assert!(record.left_before_load);
    }

    #[test]
    fn heartbeat_only_touches_last_seen() {
        let mut record = record();
        let later = record.last_seen_at + TimeDelta::seconds(5);
        record.apply(&UpdateBody::Heartbeat, later);
        assert_eq!(record.last_seen_at, later);
        assert!(record.pages.is_empty());
    }

    #[test]
    fn create_with_abandonment_is_born_flagged() {
        let request = CreateSession {
            path: "/games/outbreak".into(),
            device_info: None,
            left_before_load: Some(true),
        };
        let record = SessionRecord::new(SessionId::from_string("S2"), &request, Utc::now());
        assert!(record.left_before_load);
        assert_eq!(record.current_path, "/games/outbreak");
    }
}
