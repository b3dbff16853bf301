//! Resume Review Render Scheduler
//!
//! Viewport-driven, priority-ordered, concurrency-limited, cancellable
//! job scheduler for the resume-review document viewer.
//!
//! As the user scrolls, pages near the viewport center are rendered
//! first, at most `K` at a time (where `K` comes from the device's
//! capability tier), and work for pages that scroll out of range is
//! aborted before it wastes a slot. The actual pixel production lives
//! behind the [`RenderBackend`] seam; this crate only decides *when*
//! each page renders and when in-flight work is aborted.
//!
//! # Example
//!
//! ```
//! use resume_review_scheduler::{
//!     DeviceProfiler, Priority, RenderBackend, RenderHandle, RenderOutcome,
//!     RenderScheduler, SettleFn,
//! };
//! use std::sync::Arc;
//!
//! struct InstantEngine;
//! struct Settled;
//!
//! impl RenderHandle for Settled {
//!     fn abort(&self) {}
//! }
//!
//! impl RenderBackend for InstantEngine {
//!     fn render(&self, _page: &str, on_settle: SettleFn) -> Box<dyn RenderHandle> {
//!         on_settle(RenderOutcome::Completed);
//!         Box::new(Settled)
//!     }
//! }
//!
//! // Concurrency follows the device's capability tier.
//! let config = DeviceProfiler::detect().config().clone();
//! let scheduler = RenderScheduler::new(Arc::new(InstantEngine), config.concurrency);
//!
//! // The page nearest the viewport center carries the smallest priority.
//! scheduler.enqueue("page-0", Priority(40.0));
//! scheduler.enqueue("page-1", Priority(210.0));
//!
//! // Pages that scroll away are cancelled; unknown ids are a no-op.
//! scheduler.cancel("page-1");
//! ```

mod profile;
mod queue;
mod scheduler;
mod task;

// Re-export public API
pub use profile::{CapabilitySnapshot, DeviceProfiler, DeviceTier, TierConfig};
pub use queue::{Job, PageId, PendingQueue, Priority};
pub use scheduler::{ErrorSink, JobPhase, RenderScheduler, SchedulerStats, TracingSink};
pub use task::{RenderBackend, RenderError, RenderHandle, RenderOutcome, SettleFn};
