//! Engagement observation for one page visit.
//!
//! The host feeds raw scroll samples at whatever rate the platform fires
//! them; [`EngagementGauge`] maintains the monotone max scroll depth and the
//! scroll-active duration, and coalesces outgoing snapshots so downstream
//! delivery sees at most one update per throttle window. [`VisitPhase`] is
//! the one-shot `Loading -> Loaded | AbandonedBeforeLoad` machine that keeps
//! the normal-exit and abandoned-exit paths mutually exclusive.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// How often a coalesced scroll snapshot may be emitted.
pub const DEFAULT_SCROLL_THROTTLE: Duration = Duration::from_millis(500);
/// Largest gap between consecutive scroll samples still counted as active
/// scrolling time.
pub const DEFAULT_ACTIVITY_WINDOW: Duration = Duration::from_secs(1);

/// One raw scroll observation, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollSample {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub viewport_height: f64,
}

/// Percentage of the scrollable height reached by this sample.
///
/// A page shorter than the viewport has nothing to scroll and reads as 0.
pub fn scroll_depth_percent(sample: &ScrollSample) -> u8 {
    let scrollable = sample.scroll_height - sample.viewport_height;
    if scrollable <= 0.0 {
        return 0;
    }
    (sample.scroll_top / scrollable * 100.0).clamp(0.0, 100.0).round() as u8
}

/// A coalesced engagement reading for the current page visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngagementSnapshot {
    pub depth_percent: u8,
    pub active_ms: u64,
    /// True for the one final snapshot emitted when the visit ends.
    pub closing: bool,
}

/// Per-page engagement working state. Reset on every navigation.
#[derive(Debug, Clone)]
pub struct EngagementGauge {
    max_depth_percent: u8,
    active_ms: u64,
    last_sample_at: Option<DateTime<Utc>>,
    last_emit_at: Option<DateTime<Utc>>,
    throttle: TimeDelta,
    activity_window: TimeDelta,
}

impl EngagementGauge {
    pub fn new(throttle: Duration, activity_window: Duration) -> Self {
        Self {
            max_depth_percent: 0,
            active_ms: 0,
            last_sample_at: None,
            last_emit_at: None,
            throttle: TimeDelta::from_std(throttle).unwrap_or_default(),
            activity_window: TimeDelta::from_std(activity_window).unwrap_or_default(),
        }
    }

    /// Fold in one raw sample. Returns a snapshot when the throttle window
    /// allows another outgoing update, `None` while coalescing.
    pub fn observe(&mut self, sample: &ScrollSample, at: DateTime<Utc>) -> Option<EngagementSnapshot> {
        self.max_depth_percent = self.max_depth_percent.max(scroll_depth_percent(sample));

        if let Some(previous) = self.last_sample_at {
            let gap = at - previous;
            if gap > TimeDelta::zero() && gap <= self.activity_window {
                self.active_ms += gap.num_milliseconds().max(0) as u64;
            }
        }
        self.last_sample_at = Some(at);

        let due = match self.last_emit_at {
            None => true,
            Some(last) => at - last >= self.throttle,
        };
        if !due {
            return None;
        }
        self.last_emit_at = Some(at);
        Some(self.snapshot(false))
    }

    /// Emit the closing snapshot for this visit and reset for the next one.
    pub fn close(&mut self, _at: DateTime<Utc>) -> EngagementSnapshot {
        let closing = self.snapshot(true);
        *self = Self {
            throttle: self.throttle,
            activity_window: self.activity_window,
            ..Self::new(Duration::ZERO, Duration::ZERO)
        };
        closing
    }

    pub fn max_depth_percent(&self) -> u8 {
        self.max_depth_percent
    }

    pub fn active_ms(&self) -> u64 {
        self.active_ms
    }

    fn snapshot(&self, closing: bool) -> EngagementSnapshot {
        EngagementSnapshot {
            depth_percent: self.max_depth_percent,
            active_ms: self.active_ms,
            closing,
        }
    }
}

impl Default for EngagementGauge {
    fn default() -> Self {
        Self::new(DEFAULT_SCROLL_THROTTLE, DEFAULT_ACTIVITY_WINDOW)
    }
}

/// Terminal outcomes of one page visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePhase {
    Loading,
    Loaded,
    AbandonedBeforeLoad,
}

/// How a departure should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The page had finished loading; send the normal final update.
    AfterLoad,
    /// Still loading; report abandonment instead.
    BeforeLoad,
}

/// One-shot phase machine for a single page visit.
///
/// `visibilitychange`, `pagehide`, and `beforeunload` may all fire for the
/// same departure; whichever reaches [`VisitPhase::depart`] first decides the
/// outcome, and every later call reads as already handled.
#[derive(Debug, Clone)]
pub struct VisitPhase {
    phase: PagePhase,
    departed: bool,
}

impl VisitPhase {
    pub fn new() -> Self {
        Self {
            phase: PagePhase::Loading,
            departed: false,
        }
    }

    /// Load-completion heuristic fired (after its settling delay). Has no
    /// effect once the visit departed or already loaded.
    pub fn mark_loaded(&mut self) -> bool {
        if self.departed || self.phase != PagePhase::Loading {
            return false;
        }
        self.phase = PagePhase::Loaded;
        true
    }

    /// First departure signal wins; all others return `None`.
    pub fn depart(&mut self) -> Option<Departure> {
        if self.departed {
            return None;
        }
        self.departed = true;
        match self.phase {
            PagePhase::Loaded => Some(Departure::AfterLoad),
            PagePhase::Loading => {
                self.phase = PagePhase::AbandonedBeforeLoad;
                Some(Departure::BeforeLoad)
            }
            PagePhase::AbandonedBeforeLoad => None,
        }
    }

    pub fn phase(&self) -> PagePhase {
        self.phase
    }

    pub fn departed(&self) -> bool {
        self.departed
    }
}

impl Default for VisitPhase {
    fn default() -> Self {
        Self::new()
    }
}
