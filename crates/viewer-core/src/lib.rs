//! Viewer-side geometry for the render scheduler.
//!
//! Tracks one placeholder region per document page, watches the
//! viewport, and turns scroll and layout changes into debounced
//! enter/exit events that drive the scheduler: a region entering the
//! expanded viewport window is enqueued with a priority equal to its
//! distance from the viewport center, and a region leaving the window
//! has its render cancelled. The monitor itself is a pure state
//! machine; it holds no rendering state and works the same whether the
//! geometry comes from a real layout pass or from synthetic test input.

use resume_review_scheduler::{Priority, RenderScheduler, TierConfig};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Vertical viewport window in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportRect {
    /// Scroll offset of the viewport top.
    pub top: f32,

    /// Viewport height.
    pub height: f32,
}

impl ViewportRect {
    pub fn new(top: f32, height: f32) -> Self {
        Self { top, height }
    }

    fn center(&self) -> f32 {
        self.top + self.height / 2.0
    }
}

/// Placeholder region for one document page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRegion {
    /// Page id, forwarded to the scheduler as the job key.
    pub page: String,

    /// Top edge in document coordinates.
    pub top: f32,

    /// Region height.
    pub height: f32,
}

impl PageRegion {
    pub fn new(page: impl Into<String>, top: f32, height: f32) -> Self {
        Self {
            page: page.into(),
            top,
            height,
        }
    }

    fn bottom(&self) -> f32 {
        self.top + self.height
    }

    fn center(&self) -> f32 {
        self.top + self.height / 2.0
    }
}

/// Build one region per page from page heights and inter-page spacing,
/// stacked from the top of the document.
pub fn layout_regions(page_heights: &[f32], spacing: f32) -> Vec<PageRegion> {
    let mut regions = Vec::with_capacity(page_heights.len());
    let mut top = 0.0f32;
    for (index, height) in page_heights.iter().copied().enumerate() {
        regions.push(PageRegion::new(format!("page-{index}"), top, height));
        top += height + spacing;
    }
    regions
}

/// A region crossing the expanded viewport window boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum VisibilityEvent {
    /// The region entered the window; render it at this priority.
    Entered { page: String, priority: Priority },

    /// The region left the window; its render should be cancelled.
    Exited { page: String },
}

/// Debounced watcher over page regions and the viewport.
///
/// Scroll and layout changes mark the monitor dirty; [`poll`] performs
/// at most one visibility sweep once the debounce interval has elapsed
/// since the last change, so a burst of scroll events collapses into a
/// single pass. The debounce interval and the window margin come from
/// the device's [`TierConfig`].
///
/// [`poll`]: VisibilityMonitor::poll
pub struct VisibilityMonitor {
    regions: Vec<PageRegion>,
    margin_ratio: f32,
    debounce: Duration,
    viewport: Option<ViewportRect>,
    visible: HashSet<String>,
    dirty_since: Option<Instant>,
}

impl VisibilityMonitor {
    /// Create a monitor tuned by the device tier.
    pub fn new(config: &TierConfig) -> Self {
        Self::with_settings(config.viewport_margin_ratio, config.visibility_debounce)
    }

    /// Create a monitor with explicit margin and debounce settings.
    pub fn with_settings(margin_ratio: f32, debounce: Duration) -> Self {
        Self {
            regions: Vec::new(),
            margin_ratio,
            debounce,
            viewport: None,
            visible: HashSet::new(),
            dirty_since: None,
        }
    }

    /// Start tracking a region, replacing any previous region for the
    /// same page. A layout change, so it schedules a sweep.
    pub fn track(&mut self, region: PageRegion, now: Instant) {
        self.regions.retain(|r| r.page != region.page);
        self.regions.push(region);
        self.mark_dirty(now);
    }

    /// Stop tracking a page. If it was inside the window, the next sweep
    /// emits its exit. No-op for unknown pages.
    pub fn untrack(&mut self, page: &str, now: Instant) {
        let before = self.regions.len();
        self.regions.retain(|r| r.page != page);
        if self.regions.len() != before {
            self.mark_dirty(now);
        }
    }

    /// Record a scroll or resize.
    pub fn viewport_changed(&mut self, viewport: ViewportRect, now: Instant) {
        self.viewport = Some(viewport);
        self.mark_dirty(now);
    }

    /// Number of tracked regions.
    pub fn tracked_len(&self) -> usize {
        self.regions.len()
    }

    fn mark_dirty(&mut self, now: Instant) {
        // Trailing debounce: every change pushes the sweep out again.
        self.dirty_since = Some(now);
    }

    /// Run a sweep if one is due, returning the boundary crossings since
    /// the previous sweep. Returns nothing while the debounce interval
    /// is still running or nothing changed.
    pub fn poll(&mut self, now: Instant) -> Vec<VisibilityEvent> {
        let Some(since) = self.dirty_since else {
            return Vec::new();
        };
        if now.duration_since(since) < self.debounce {
            return Vec::new();
        }
        self.dirty_since = None;
        self.sweep()
    }

    fn sweep(&mut self) -> Vec<VisibilityEvent> {
        let Some(viewport) = self.viewport else {
            return Vec::new();
        };
        let margin = self.margin_ratio * viewport.height;
        let window_top = viewport.top - margin;
        let window_bottom = viewport.top + viewport.height + margin;
        let viewport_center = viewport.center();

        let mut events = Vec::new();
        let mut now_visible = HashSet::with_capacity(self.regions.len());
        for region in &self.regions {
            let intersects = region.top < window_bottom && region.bottom() > window_top;
            if !intersects {
                continue;
            }
            now_visible.insert(region.page.clone());
            if !self.visible.contains(&region.page) {
                let distance = (region.center() - viewport_center).abs();
                events.push(VisibilityEvent::Entered {
                    page: region.page.clone(),
                    priority: Priority(f64::from(distance)),
                });
            }
        }
        for page in &self.visible {
            if !now_visible.contains(page) {
                events.push(VisibilityEvent::Exited { page: page.clone() });
            }
        }
        trace!(
            visible = now_visible.len(),
            events = events.len(),
            "visibility sweep"
        );
        self.visible = now_visible;
        events
    }
}

/// Glue between the visibility monitor and the scheduler.
///
/// Owns the monitor, forwards `Exited` events as `cancel` and the
/// `Entered` events of a sweep as one `enqueue_batch`, so every sweep
/// is a single scheduling decision. The scheduler stays the only owner
/// of job state.
pub struct RenderDriver {
    monitor: VisibilityMonitor,
    scheduler: Arc<RenderScheduler>,
}

impl RenderDriver {
    pub fn new(scheduler: Arc<RenderScheduler>, config: &TierConfig) -> Self {
        Self {
            monitor: VisibilityMonitor::new(config),
            scheduler,
        }
    }

    /// The underlying monitor, for region tracking.
    pub fn monitor_mut(&mut self) -> &mut VisibilityMonitor {
        &mut self.monitor
    }

    /// Record a scroll or resize.
    pub fn viewport_changed(&mut self, viewport: ViewportRect, now: Instant) {
        self.monitor.viewport_changed(viewport, now);
    }

    /// Apply any due visibility events to the scheduler.
    ///
    /// Exits are cancelled first so their slots are free when the batch
    /// of newly entered pages is handed over.
    pub fn pump(&mut self, now: Instant) {
        let mut entered = Vec::new();
        for event in self.monitor.poll(now) {
            match event {
                VisibilityEvent::Entered { page, priority } => entered.push((page, priority)),
                VisibilityEvent::Exited { page } => self.scheduler.cancel(&page),
            }
        }
        if !entered.is_empty() {
            self.scheduler.enqueue_batch(entered);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resume_review_scheduler::{
        DeviceTier, JobPhase, RenderBackend, RenderHandle, SettleFn,
    };

    fn monitor(margin_ratio: f32, debounce_ms: u64) -> VisibilityMonitor {
        VisibilityMonitor::with_settings(margin_ratio, Duration::from_millis(debounce_ms))
    }

    fn pages(events: &[VisibilityEvent]) -> (Vec<String>, Vec<String>) {
        let mut entered = Vec::new();
        let mut exited = Vec::new();
        for event in events {
            match event {
                VisibilityEvent::Entered { page, .. } => entered.push(page.clone()),
                VisibilityEvent::Exited { page } => exited.push(page.clone()),
            }
        }
        entered.sort();
        exited.sort();
        (entered, exited)
    }

    #[test]
    fn test_layout_regions() {
        let regions = layout_regions(&[1000.0, 800.0, 1000.0], 16.0);
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0], PageRegion::new("page-0", 0.0, 1000.0));
        assert_eq!(regions[1], PageRegion::new("page-1", 1016.0, 800.0));
        assert_eq!(regions[2], PageRegion::new("page-2", 1832.0, 1000.0));
    }

    #[test]
    fn test_enter_and_exit_on_scroll() {
        let mut monitor = monitor(0.0, 0);
        let now = Instant::now();
        for region in layout_regions(&[1000.0; 5], 0.0) {
            monitor.track(region, now);
        }

        // Viewport over pages 0 and 1.
        monitor.viewport_changed(ViewportRect::new(500.0, 1000.0), now);
        let (entered, exited) = pages(&monitor.poll(now));
        assert_eq!(entered, vec!["page-0".to_string(), "page-1".to_string()]);
        assert!(exited.is_empty());

        // Scroll down two pages: 0 and 1 leave, 2 and 3 enter.
        monitor.viewport_changed(ViewportRect::new(2500.0, 1000.0), now);
        let (entered, exited) = pages(&monitor.poll(now));
        assert_eq!(entered, vec!["page-2".to_string(), "page-3".to_string()]);
        assert_eq!(exited, vec!["page-0".to_string(), "page-1".to_string()]);
    }

    #[test]
    fn test_still_visible_regions_emit_nothing() {
        let mut monitor = monitor(0.0, 0);
        let now = Instant::now();
        for region in layout_regions(&[2000.0; 3], 0.0) {
            monitor.track(region, now);
        }

        monitor.viewport_changed(ViewportRect::new(0.0, 1000.0), now);
        assert!(!monitor.poll(now).is_empty());

        // A small scroll that changes no memberships sweeps silently.
        monitor.viewport_changed(ViewportRect::new(10.0, 1000.0), now);
        assert!(monitor.poll(now).is_empty());
    }

    #[test]
    fn test_priority_is_distance_from_viewport_center() {
        let mut monitor = monitor(0.0, 0);
        let now = Instant::now();
        for region in layout_regions(&[1000.0; 4], 0.0) {
            monitor.track(region, now);
        }

        // Viewport 0..2500, centered at 1250.
        monitor.viewport_changed(ViewportRect::new(0.0, 2500.0), now);
        let events = monitor.poll(now);

        let priority_of = |page: &str| {
            events
                .iter()
                .find_map(|e| match e {
                    VisibilityEvent::Entered { page: p, priority } if p == page => Some(*priority),
                    _ => None,
                })
                .unwrap()
        };
        // Page centers sit at 500, 1500, 2500.
        assert_eq!(priority_of("page-0"), Priority(750.0));
        assert_eq!(priority_of("page-1"), Priority(250.0));
        assert_eq!(priority_of("page-2"), Priority(1250.0));
        assert!(priority_of("page-1") < priority_of("page-0"));
        assert!(priority_of("page-0") < priority_of("page-2"));
    }

    #[test]
    fn test_margin_expands_the_window() {
        let now = Instant::now();
        let regions = layout_regions(&[1000.0; 4], 0.0);

        // Without margin, page-2 (top 2000) is outside a 0..1000 viewport.
        let mut tight = monitor(0.0, 0);
        for region in &regions {
            tight.track(region.clone(), now);
        }
        tight.viewport_changed(ViewportRect::new(0.0, 1000.0), now);
        let (entered, _) = pages(&tight.poll(now));
        assert_eq!(entered, vec!["page-0".to_string()]);

        // A margin of 1.5 viewport heights reaches down to 2500.
        let mut wide = monitor(1.5, 0);
        for region in &regions {
            wide.track(region.clone(), now);
        }
        wide.viewport_changed(ViewportRect::new(0.0, 1000.0), now);
        let (entered, _) = pages(&wide.poll(now));
        assert_eq!(
            entered,
            vec![
                "page-0".to_string(),
                "page-1".to_string(),
                "page-2".to_string()
            ]
        );
    }

    #[test]
    fn test_burst_collapses_into_one_sweep() {
        let mut monitor = monitor(0.0, 100);
        let start = Instant::now();
        monitor.track(PageRegion::new("page-0", 0.0, 1000.0), start);

        // A burst of scroll events 10ms apart.
        for i in 0..5u64 {
            monitor.viewport_changed(
                ViewportRect::new(i as f32, 1000.0),
                start + Duration::from_millis(10 * i),
            );
            // Still inside the debounce window: nothing comes out.
            assert!(monitor
                .poll(start + Duration::from_millis(10 * i + 5))
                .is_empty());
        }

        // One quiet debounce interval later, a single sweep fires.
        let quiet = start + Duration::from_millis(40 + 100);
        let events = monitor.poll(quiet);
        assert_eq!(events.len(), 1);
        // And nothing more until the next change.
        assert!(monitor.poll(quiet + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn test_zero_debounce_sweeps_immediately() {
        let mut monitor = monitor(0.0, 0);
        let now = Instant::now();
        monitor.track(PageRegion::new("page-0", 0.0, 1000.0), now);
        monitor.viewport_changed(ViewportRect::new(0.0, 1000.0), now);
        assert_eq!(monitor.poll(now).len(), 1);
    }

    #[test]
    fn test_untrack_emits_exit() {
        let mut monitor = monitor(0.0, 0);
        let now = Instant::now();
        monitor.track(PageRegion::new("page-0", 0.0, 1000.0), now);
        monitor.viewport_changed(ViewportRect::new(0.0, 1000.0), now);
        monitor.poll(now);

        monitor.untrack("page-0", now);
        let (entered, exited) = pages(&monitor.poll(now));
        assert!(entered.is_empty());
        assert_eq!(exited, vec!["page-0".to_string()]);
        assert_eq!(monitor.tracked_len(), 0);

        // Unknown pages are a no-op and schedule no sweep.
        monitor.untrack("page-9", now);
        assert!(monitor.poll(now + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn test_track_replaces_same_page() {
        let mut monitor = monitor(0.0, 0);
        let now = Instant::now();
        monitor.track(PageRegion::new("page-0", 0.0, 1000.0), now);
        monitor.track(PageRegion::new("page-0", 5000.0, 1000.0), now);
        assert_eq!(monitor.tracked_len(), 1);

        // Only the latest geometry counts.
        monitor.viewport_changed(ViewportRect::new(0.0, 1000.0), now);
        assert!(pages(&monitor.poll(now)).0.is_empty());
    }

    #[test]
    fn test_no_viewport_no_events() {
        let mut monitor = monitor(0.0, 0);
        let now = Instant::now();
        monitor.track(PageRegion::new("page-0", 0.0, 1000.0), now);
        assert!(monitor.poll(now).is_empty());
    }

    // Minimal engine double for driver tests: tasks stay in flight
    // forever, which is all the driver-side assertions need.
    #[derive(Default)]
    struct StickyEngine {
        started: std::sync::Mutex<Vec<String>>,
    }

    struct NoopHandle;

    impl RenderHandle for NoopHandle {
        fn abort(&self) {}
    }

    impl RenderBackend for StickyEngine {
        fn render(&self, page: &str, _on_settle: SettleFn) -> Box<dyn RenderHandle> {
            self.started.lock().unwrap().push(page.to_string());
            Box::new(NoopHandle)
        }
    }

    #[test]
    fn test_driver_enqueues_and_cancels() {
        // High-tier config with zero debounce so pumps act immediately.
        let mut config = TierConfig::for_tier(DeviceTier::High);
        config.visibility_debounce = Duration::ZERO;
        config.viewport_margin_ratio = 0.0;
        assert_eq!(config.tier, DeviceTier::High);

        let engine = Arc::new(StickyEngine::default());
        let scheduler = RenderScheduler::new(engine.clone(), config.concurrency);
        let mut driver = RenderDriver::new(scheduler.clone(), &config);

        let now = Instant::now();
        for region in layout_regions(&[1000.0; 8], 0.0) {
            driver.monitor_mut().track(region, now);
        }

        // Viewport over pages 2 and 3: both start rendering.
        driver.viewport_changed(ViewportRect::new(2500.0, 1000.0), now);
        driver.pump(now);
        let mut started = engine.started.lock().unwrap().clone();
        started.sort();
        assert_eq!(started, vec!["page-2".to_string(), "page-3".to_string()]);

        // Scroll far away: the old pages are cancelled, new ones start.
        driver.viewport_changed(ViewportRect::new(6500.0, 1000.0), now);
        driver.pump(now);
        assert_eq!(scheduler.job_phase("page-2"), None);
        assert_eq!(scheduler.job_phase("page-3"), None);
        assert_eq!(scheduler.job_phase("page-6"), Some(JobPhase::Running));
        assert_eq!(scheduler.job_phase("page-7"), Some(JobPhase::Running));
    }

    #[test]
    fn test_driver_priority_order_limits_starts() {
        // K = 1: only the page nearest the viewport center may start.
        let engine = Arc::new(StickyEngine::default());
        let scheduler = RenderScheduler::new(engine.clone(), 1);
        let config = TierConfig {
            tier: DeviceTier::Low,
            concurrency: 1,
            visibility_debounce: Duration::ZERO,
            viewport_margin_ratio: 1.0,
        };
        let mut driver = RenderDriver::new(scheduler.clone(), &config);

        let now = Instant::now();
        for region in layout_regions(&[1000.0; 6], 0.0) {
            driver.monitor_mut().track(region, now);
        }
        driver.viewport_changed(ViewportRect::new(2000.0, 1000.0), now);
        driver.pump(now);

        // Page 2 is centered under the viewport; it must hold the only
        // slot while its neighbors wait.
        assert_eq!(
            engine.started.lock().unwrap().first(),
            Some(&"page-2".to_string())
        );
        assert_eq!(scheduler.job_phase("page-2"), Some(JobPhase::Running));
        assert_eq!(scheduler.job_phase("page-1"), Some(JobPhase::Pending));
        assert_eq!(scheduler.job_phase("page-3"), Some(JobPhase::Pending));
    }
}
