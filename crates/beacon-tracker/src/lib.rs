//! The visit tracker facade.
//!
//! [`VisitTracker`] wires identity resolution, engagement observation,
//! interaction recording, and delivery into one object the host glue drives:
//! it feeds lifecycle signals (`start`, `navigate`, `mark_load_event`,
//! `departure`), raw scroll samples, clicks, and video signals, and the
//! tracker turns them into backend updates. Every entry point is
//! non-throwing; tracking failures degrade to "nothing reported this cycle"
//! and never reach the page.

use std::sync::Arc;
use std::time::Duration;

use beacon_delivery::{DeliveryCoordinator, HttpTransport, MemoryTransport};
use beacon_engage::{
    DEFAULT_ACTIVITY_WINDOW, DEFAULT_SCROLL_THROTTLE, Departure, EngagementGauge, ScrollSample,
    VisitPhase,
};
use beacon_identity::{
    DEFAULT_PROBE_BUDGET, DEFAULT_SESSION_TTL, MemoryHandleStore, NoDeviceProbe, SessionResolver,
    SystemClock,
};
use beacon_interact::cta::DEFAULT_CTA_DEDUP_WINDOW;
use beacon_interact::video::DEFAULT_VIDEO_PROGRESS_EVERY;
use beacon_interact::{ClickEvent, CtaDeduper, CtaRules, PlayerState, VideoTracker, classify,
    parse_player_message};
use beacon_protocol::{
    Clock, CreateSession, CtaClass, CtaSource, DeviceProbe, HandleStore, SessionId,
    SessionTransport, SessionUpdate, UpdateBody, VideoId, VideoKind,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

/// Settling delay after the platform load signal before a page counts as
/// loaded (late images keep painting past the event).
pub const DEFAULT_LOAD_SETTLE: Duration = Duration::from_secs(2);
/// Keep-alive cadence.
pub const DEFAULT_HEARTBEAT_EVERY: Duration = Duration::from_secs(5);
/// How long the departure handler waits for an in-flight create before
/// reporting identifier-less.
pub const DEFAULT_DEPARTURE_RACE: Duration = Duration::from_millis(100);

/// All tunable windows, with the production values as defaults.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub session_ttl: Duration,
    pub probe_budget: Duration,
    pub heartbeat_every: Duration,
    pub scroll_throttle: Duration,
    pub activity_window: Duration,
    pub load_settle: Duration,
    pub cta_dedup_window: Duration,
    pub video_progress_every: Duration,
    pub departure_race: Duration,
    pub cta_rules: CtaRules,
    /// Path prefixes excluded from tracking (the internal dashboard).
    pub excluded_prefixes: Vec<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            probe_budget: DEFAULT_PROBE_BUDGET,
            heartbeat_every: DEFAULT_HEARTBEAT_EVERY,
            scroll_throttle: DEFAULT_SCROLL_THROTTLE,
            activity_window: DEFAULT_ACTIVITY_WINDOW,
            load_settle: DEFAULT_LOAD_SETTLE,
            cta_dedup_window: DEFAULT_CTA_DEDUP_WINDOW,
            video_progress_every: DEFAULT_VIDEO_PROGRESS_EVERY,
            departure_race: DEFAULT_DEPARTURE_RACE,
            cta_rules: CtaRules::default(),
            excluded_prefixes: vec!["/dashboard".to_owned()],
        }
    }
}

#[derive(Default)]
pub struct TrackerBuilder {
    config: Option<TrackerConfig>,
    transport: Option<Arc<dyn SessionTransport>>,
    store: Option<Arc<dyn HandleStore>>,
    clock: Option<Arc<dyn Clock>>,
    probe: Option<Arc<dyn DeviceProbe>>,
}

impl TrackerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Track against a live backend at this sessions endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.transport = Some(Arc::new(HttpTransport::new(endpoint)));
        self
    }

    pub fn transport(mut self, transport: Arc<dyn SessionTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn handle_store(mut self, store: Arc<dyn HandleStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn device_probe(mut self, probe: Arc<dyn DeviceProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn build(self) -> VisitTracker {
        let config = self.config.unwrap_or_default();
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(MemoryTransport::default()));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryHandleStore::default()));
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let probe = self.probe.unwrap_or_else(|| Arc::new(NoDeviceProbe));

        let resolver = SessionResolver::new(
            transport.clone(),
            store,
            clock.clone(),
            probe,
            config.session_ttl,
            config.probe_budget,
        );
        let coordinator = DeliveryCoordinator::new(transport.clone(), resolver.clone());

        VisitTracker {
            inner: Arc::new(TrackerInner {
                gauge: Mutex::new(EngagementGauge::new(
                    config.scroll_throttle,
                    config.activity_window,
                )),
                phase: Mutex::new(VisitPhase::new()),
                cta: Mutex::new(CtaDeduper::new(config.cta_dedup_window)),
                videos: Mutex::new(VideoTracker::new(config.video_progress_every)),
                current_path: Mutex::new("/".to_owned()),
                heartbeat: Mutex::new(None),
                settle: Mutex::new(None),
                config,
                transport,
                resolver,
                coordinator,
                clock,
            }),
        }
    }
}

struct TrackerInner {
    config: TrackerConfig,
    transport: Arc<dyn SessionTransport>,
    resolver: SessionResolver,
    coordinator: DeliveryCoordinator,
    clock: Arc<dyn Clock>,
    gauge: Mutex<EngagementGauge>,
    phase: Mutex<VisitPhase>,
    cta: Mutex<CtaDeduper>,
    videos: Mutex<VideoTracker>,
    current_path: Mutex<String>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    settle: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct VisitTracker {
    inner: Arc<TrackerInner>,
}

impl VisitTracker {
    pub fn builder() -> TrackerBuilder {
        TrackerBuilder::new()
    }

    /// The globally readable session identifier, once resolved.
    pub fn current_session(&self) -> Option<SessionId> {
        self.inner.resolver.current()
    }

    /// Mount the tracker on its first page: resolve the session, report the
    /// landing path, and start the heartbeat.
    #[instrument(skip(self), fields(path = %path))]
    pub async fn start(&self, path: &str) {
        *self.inner.current_path.lock() = path.to_owned();
        if !self.is_excluded(path) && self.inner.resolver.resolve(path).await.is_some() {
            self.inner
                .coordinator
                .deliver(
                    path,
                    UpdateBody::Page {
                        path: path.to_owned(),
                    },
                )
                .await;
        }
        self.spawn_heartbeat();
    }

    /// In-site navigation: finalize the departing page's engagement, reset
    /// per-page state, and open the next visit.
    #[instrument(skip(self), fields(path = %path))]
    pub async fn navigate(&self, path: &str) {
        let previous = {
            let mut current = self.inner.current_path.lock();
            std::mem::replace(&mut *current, path.to_owned())
        };
        self.abort_settle();

        let closing = {
            let now = self.inner.clock.now();
            self.inner.gauge.lock().close(now)
        };
        {
            let mut phase = self.inner.phase.lock();
            *phase = VisitPhase::new();
        }
        self.inner.videos.lock().clear();

        if !self.is_excluded(&previous) {
            self.inner
                .coordinator
                .deliver(
                    &previous,
                    UpdateBody::Scroll {
                        path: previous.clone(),
                        depth_percent: closing.depth_percent,
                        active_ms: closing.active_ms,
                        closing: true,
                    },
                )
                .await;
        }
        if !self.is_excluded(path) {
            self.inner
                .coordinator
                .deliver(
                    path,
                    UpdateBody::Page {
                        path: path.to_owned(),
                    },
                )
                .await;
        }
    }

    /// The platform's load-completion signal fired (or the document was
    /// already complete at attach time). The page counts as loaded after the
    /// settling delay, unless the visitor departs first.
    pub fn mark_load_event(&self) {
        let tracker = self.clone();
        let settle = self.inner.config.load_settle;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            if tracker.inner.phase.lock().mark_loaded() {
                debug!("page settled as loaded");
            }
        });
        if let Some(previous) = self.inner.settle.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Raw scroll sample from the host. Coalesced; at most one outgoing
    /// update per throttle window.
    pub async fn on_scroll(&self, sample: ScrollSample) {
        let path = self.current_path();
        if self.is_excluded(&path) || self.inner.phase.lock().departed() {
            return;
        }
        let snapshot = {
            let now = self.inner.clock.now();
            self.inner.gauge.lock().observe(&sample, now)
        };
        if let Some(snapshot) = snapshot {
            self.inner
                .coordinator
                .deliver(
                    &path,
                    UpdateBody::Scroll {
                        path: path.clone(),
                        depth_percent: snapshot.depth_percent,
                        active_ms: snapshot.active_ms,
                        closing: false,
                    },
                )
                .await;
        }
    }

    /// Passive page-wide click path. Skips clicks owned by explicit
    /// component instrumentation, classifies the rest, and reports over the
    /// fire-and-forget transport so the click's navigation is never blocked.
    pub async fn on_click(&self, click: ClickEvent) {
        let path = self.current_path();
        if self.is_excluded(&path) || click.explicitly_handled {
            return;
        }
        let label = click.text.trim().to_owned();
        let class = classify(&click.href, &label, &click.classes, &self.inner.config.cta_rules);
        let fresh = {
            let now = self.inner.clock.now();
            self.inner.cta.lock().should_report(&click.href, &label, now)
        };
        if !fresh {
            return;
        }
        if self.inner.resolver.resolve(&path).await.is_some() {
            self.inner.coordinator.deliver_final(UpdateBody::Cta {
                source: CtaSource::Passive,
                label,
                class,
                target_url: click.href,
            });
        }
    }

    /// Explicit booking path: the owning component prevented the default
    /// navigation, awaits this report, and only then opens the destination.
    pub async fn report_booking_click(&self, label: &str, target_url: &str) -> bool {
        let path = self.current_path();
        if self.is_excluded(&path) {
            return false;
        }
        let fresh = {
            let now = self.inner.clock.now();
            self.inner.cta.lock().should_report(target_url, label, now)
        };
        if !fresh {
            return false;
        }
        self.inner
            .coordinator
            .deliver(
                &path,
                UpdateBody::Cta {
                    source: CtaSource::Explicit,
                    label: label.to_owned(),
                    class: CtaClass::Booking,
                    target_url: target_url.to_owned(),
                },
            )
            .await
    }

    pub async fn on_video_play(&self, video_id: &VideoId, title: &str, kind: VideoKind) {
        let body = {
            let now = self.inner.clock.now();
            self.inner.videos.lock().started(video_id, title, kind, now)
        };
        self.deliver_video(body).await;
    }

    pub async fn on_video_progress(&self, video_id: &VideoId, watched_secs: u64, percent: u8) {
        let body = {
            let now = self.inner.clock.now();
            self.inner
                .videos
                .lock()
                .progress(video_id, watched_secs, percent, now)
        };
        self.deliver_video(body).await;
    }

    pub async fn on_video_ended(&self, video_id: &VideoId, watched_secs: u64) {
        let body = {
            let now = self.inner.clock.now();
            self.inner.videos.lock().ended(video_id, watched_secs, now)
        };
        self.deliver_video(body).await;
    }

    /// Raw cross-origin message from an embedded player frame. Unknown or
    /// unparseable payloads are ignored silently.
    pub async fn on_embed_message(&self, raw: &str) {
        let Some(change) = parse_player_message(raw) else {
            return;
        };
        match change.state {
            PlayerState::Playing => {
                let title = change.video_id.as_str().to_owned();
                self.on_video_play(&change.video_id, &title, VideoKind::Embedded)
                    .await;
            }
            PlayerState::Ended => self.on_video_ended(&change.video_id, 0).await,
        }
    }

    /// The one-shot departure routine. `visibilitychange`, `pagehide`, and
    /// `beforeunload` are redundant triggers for this single idempotent
    /// action; the first caller decides the outcome.
    #[instrument(skip(self))]
    pub async fn departure(&self) {
        let outcome = self.inner.phase.lock().depart();
        let Some(outcome) = outcome else {
            return;
        };
        let path = self.current_path();
        if self.is_excluded(&path) {
            return;
        }
        match outcome {
            Departure::AfterLoad => {
                let closing = {
                    let now = self.inner.clock.now();
                    self.inner.gauge.lock().close(now)
                };
                if self.inner.coordinator.deliver_final(UpdateBody::Scroll {
                    path: path.clone(),
                    depth_percent: closing.depth_percent,
                    active_ms: closing.active_ms,
                    closing: true,
                }) {
                    self.inner.coordinator.deliver_final(UpdateBody::Heartbeat);
                }
            }
            Departure::BeforeLoad => self.report_abandonment(&path).await,
        }
    }

    /// Tear down timers. Orphaned heartbeats must not accumulate across
    /// navigations or app unmounts.
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.heartbeat.lock().take() {
            handle.abort();
        }
        self.abort_settle();
    }

    async fn report_abandonment(&self, path: &str) {
        let resolved = match self.inner.resolver.current() {
            Some(id) => Some(id),
            // A creation may still be in flight; give it a short head start
            // before reporting identifier-less.
            None => {
                tokio::time::timeout(self.inner.config.departure_race, self.inner.resolver.settled())
                    .await
                    .ok()
                    .flatten()
            }
        };
        match resolved {
            Some(id) => {
                self.inner.transport.send_final(SessionUpdate::new(
                    id,
                    UpdateBody::Status {
                        left_before_load: true,
                    },
                ));
            }
            None => {
                // The session is born already marked as abandoned.
                self.inner.coordinator.create_final(CreateSession {
                    path: path.to_owned(),
                    device_info: None,
                    left_before_load: Some(true),
                });
            }
        }
    }

    async fn deliver_video(&self, body: Option<UpdateBody>) {
        if let Some(body) = body {
            let path = self.current_path();
            if self.is_excluded(&path) {
                return;
            }
            self.inner.coordinator.deliver(&path, body).await;
        }
    }

    fn spawn_heartbeat(&self) {
        let tracker = self.clone();
        let every = self.inner.config.heartbeat_every;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The immediate first tick; the landing page update covers it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let path = tracker.current_path();
                if tracker.is_excluded(&path) {
                    continue;
                }
                if tracker
                    .inner
                    .coordinator
                    .deliver(&path, UpdateBody::Heartbeat)
                    .await
                {
                    tracker.inner.resolver.refresh();
                }
            }
        });
        if let Some(previous) = self.inner.heartbeat.lock().replace(handle) {
            previous.abort();
        }
    }

    fn abort_settle(&self) {
        if let Some(handle) = self.inner.settle.lock().take() {
            handle.abort();
        }
    }

    fn current_path(&self) -> String {
        self.inner.current_path.lock().clone()
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.inner
            .config
            .excluded_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}
