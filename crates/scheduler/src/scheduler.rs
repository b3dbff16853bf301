//! Concurrency-limited render scheduler
//!
//! The single authority for starting, tracking, and aborting render
//! jobs. At most `K` jobs run simultaneously; pending jobs wait in a
//! priority queue and are promoted as slots free up. Cancellation is
//! explicit and idempotent, and a failing page never stalls the
//! scheduling of others.

use crate::queue::{Job, PageId, PendingQueue, Priority};
use crate::task::{RenderBackend, RenderError, RenderHandle, RenderOutcome, SettleFn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, warn};

/// Destination for render failures.
///
/// Only genuine failures are reported here; cancellations are expected
/// and stay silent. Injectable so hosts can surface failures their own
/// way (and so tests can count them).
pub trait ErrorSink: Send + Sync {
    /// A job settled with a failure. Called exactly once per failed job.
    fn render_failed(&self, page: &str, error: &RenderError);
}

/// Default sink: log the failure and move on.
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn render_failed(&self, page: &str, error: &RenderError) {
        warn!(page, %error, "render job failed");
    }
}

/// Live phase of a job still owned by the scheduler.
///
/// Jobs are dropped from the scheduler's sets the moment they settle
/// (completed, failed, or cancelled), so terminal jobs have no queryable
/// phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    /// Waiting for a concurrency slot.
    Pending,
    /// Handed to the rendering engine, not yet settled.
    Running,
}

/// Scheduler counters and live set sizes.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    /// Jobs accepted through `enqueue` / `enqueue_batch`.
    pub jobs_submitted: u64,

    /// Jobs handed to the rendering engine.
    pub jobs_started: u64,

    /// Jobs that settled successfully.
    pub jobs_completed: u64,

    /// Jobs that settled with a render failure.
    pub jobs_failed: u64,

    /// Jobs cancelled while pending or running.
    pub jobs_cancelled: u64,

    /// Jobs currently waiting for a slot.
    pub pending_size: usize,

    /// Jobs currently running.
    pub running_size: usize,
}

struct RunningJob {
    /// Execution sequence number; a late settle from an execution that
    /// was already cancelled matches against this and is ignored.
    exec: u64,

    /// Stored priority. Has no effect on the current execution, only on
    /// tie-breaks should the id be re-enqueued later.
    priority: Priority,

    /// Abort hook, present once the backend call has returned.
    handle: Option<Box<dyn RenderHandle>>,
}

struct CoreState {
    pending: PendingQueue,
    running: HashMap<PageId, RunningJob>,
    next_exec: u64,
    draining: bool,
    drain_requested: bool,
    stats: SchedulerStats,
}

enum CancelAction {
    NotFound,
    DroppedPending,
    AbortRunning(Option<Box<dyn RenderHandle>>),
}

/// Viewport-driven, concurrency-limited, cancellable render scheduler.
///
/// Thread-safe; all queue mutation and slot accounting happen atomically
/// relative to other scheduler calls. The scheduler does not own threads
/// or block on render tasks: it only decides when the backend's `render`
/// is invoked and when a task's abort hook is pulled.
///
/// A task that never settles holds its slot indefinitely; there is no
/// implicit timeout. Deadlines, if needed, belong in a layer above.
///
/// # Example
///
/// ```
/// use resume_review_scheduler::{
///     Priority, RenderBackend, RenderHandle, RenderOutcome, RenderScheduler, SettleFn,
/// };
/// use std::sync::Arc;
///
/// struct InstantEngine;
/// struct Settled;
///
/// impl RenderHandle for Settled {
///     fn abort(&self) {}
/// }
///
/// impl RenderBackend for InstantEngine {
///     fn render(&self, _page: &str, on_settle: SettleFn) -> Box<dyn RenderHandle> {
///         on_settle(RenderOutcome::Completed);
///         Box::new(Settled)
///     }
/// }
///
/// let scheduler = RenderScheduler::new(Arc::new(InstantEngine), 2);
/// scheduler.enqueue("page-0", Priority(12.5));
/// assert_eq!(scheduler.stats().jobs_completed, 1);
/// ```
pub struct RenderScheduler {
    state: Mutex<CoreState>,
    backend: Arc<dyn RenderBackend>,
    errors: Arc<dyn ErrorSink>,
    limit: usize,
    weak_self: Weak<RenderScheduler>,
}

impl RenderScheduler {
    /// Create a scheduler over `backend` running at most `concurrency`
    /// jobs at once, reporting failures through [`TracingSink`].
    ///
    /// A `concurrency` of zero is clamped to one.
    pub fn new(backend: Arc<dyn RenderBackend>, concurrency: usize) -> Arc<Self> {
        Self::with_error_sink(backend, concurrency, Arc::new(TracingSink))
    }

    /// Create a scheduler with a custom failure sink.
    pub fn with_error_sink(
        backend: Arc<dyn RenderBackend>,
        concurrency: usize,
        errors: Arc<dyn ErrorSink>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            state: Mutex::new(CoreState {
                pending: PendingQueue::new(),
                running: HashMap::new(),
                next_exec: 0,
                draining: false,
                drain_requested: false,
                stats: SchedulerStats::default(),
            }),
            backend,
            errors,
            limit: concurrency.max(1),
            weak_self: weak.clone(),
        })
    }

    /// The concurrency limit `K`.
    pub fn concurrency(&self) -> usize {
        self.limit
    }

    /// Register or update a job.
    ///
    /// A new id goes pending; an already-pending id is repositioned at
    /// the new priority; a running id only has its stored priority
    /// updated and never starts a second execution. Afterwards the
    /// scheduler drains: if a slot is free, the highest-priority pending
    /// job starts immediately.
    pub fn enqueue(&self, page: impl Into<PageId>, priority: Priority) {
        self.enqueue_batch(std::iter::once((page.into(), priority)));
    }

    /// Register or update several jobs atomically, then drain once.
    ///
    /// A whole visibility sweep lands as a single scheduling decision:
    /// with free slots, the lowest-priority jobs of the batch win them
    /// regardless of their order within the batch.
    pub fn enqueue_batch<I>(&self, jobs: I)
    where
        I: IntoIterator<Item = (PageId, Priority)>,
    {
        {
            let mut state = self.state.lock().unwrap();
            for (page, priority) in jobs {
                state.stats.jobs_submitted += 1;
                if let Some(running) = state.running.get_mut(&page) {
                    running.priority = priority;
                } else {
                    state.pending.insert_or_update(page, priority);
                }
            }
        }
        self.drain();
    }

    /// Cancel a job by id. Idempotent; unknown or already-settled ids
    /// are a no-op.
    ///
    /// A pending job is removed without its render ever starting. A
    /// running job has its abort hook pulled exactly once and its slot
    /// freed immediately; the engine's own late settlement for that
    /// execution is ignored.
    pub fn cancel(&self, page: &str) {
        let action = {
            let mut state = self.state.lock().unwrap();
            if state.pending.remove(page) {
                state.stats.jobs_cancelled += 1;
                CancelAction::DroppedPending
            } else if let Some(mut running) = state.running.remove(page) {
                state.stats.jobs_cancelled += 1;
                CancelAction::AbortRunning(running.handle.take())
            } else {
                CancelAction::NotFound
            }
        };
        match action {
            CancelAction::DroppedPending => {
                debug!(page, "pending job cancelled");
            }
            CancelAction::AbortRunning(handle) => {
                // A missing handle means the job is still mid-start; the
                // start path aborts the fresh handle when it finds the
                // running entry gone.
                if let Some(handle) = handle {
                    handle.abort();
                }
                debug!(page, "running job cancelled");
                self.drain();
            }
            CancelAction::NotFound => {}
        }
    }

    /// Cancel every pending and running job, e.g. when the document
    /// closes. Idempotent.
    pub fn cancel_all(&self) {
        let handles: Vec<Box<dyn RenderHandle>> = {
            let mut state = self.state.lock().unwrap();
            let dropped = state.pending.len();
            state.pending.clear();
            let running: Vec<RunningJob> = state.running.drain().map(|(_, job)| job).collect();
            state.stats.jobs_cancelled += (dropped + running.len()) as u64;
            running
                .into_iter()
                .filter_map(|mut job| job.handle.take())
                .collect()
        };
        for handle in &handles {
            handle.abort();
        }
        if !handles.is_empty() {
            debug!(aborted = handles.len(), "cancelled all jobs");
        }
    }

    /// Live phase of a job, or `None` once it has settled (or was never
    /// enqueued).
    pub fn job_phase(&self, page: &str) -> Option<JobPhase> {
        let state = self.state.lock().unwrap();
        if state.running.contains_key(page) {
            Some(JobPhase::Running)
        } else if state.pending.contains(page) {
            Some(JobPhase::Pending)
        } else {
            None
        }
    }

    /// Stored priority of a live job: queue position for a pending job,
    /// the last enqueued value for a running one.
    pub fn stored_priority(&self, page: &str) -> Option<Priority> {
        let state = self.state.lock().unwrap();
        state
            .running
            .get(page)
            .map(|job| job.priority)
            .or_else(|| state.pending.priority_of(page))
    }

    /// Number of jobs waiting for a slot.
    pub fn pending_len(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Number of jobs currently running.
    pub fn running_len(&self) -> usize {
        self.state.lock().unwrap().running.len()
    }

    /// Pages currently running, in arbitrary order.
    pub fn running_pages(&self) -> Vec<PageId> {
        self.state.lock().unwrap().running.keys().cloned().collect()
    }

    /// Snapshot of the scheduler counters and live set sizes.
    pub fn stats(&self) -> SchedulerStats {
        let state = self.state.lock().unwrap();
        let mut stats = state.stats.clone();
        stats.pending_size = state.pending.len();
        stats.running_size = state.running.len();
        stats
    }

    /// Promote pending jobs into free slots until the limit or the queue
    /// is exhausted.
    ///
    /// Iterative, never recursive: a settle callback firing from inside
    /// a `render` call (or a completion handler racing us from another
    /// thread) only flags a re-check instead of nesting another drain on
    /// the stack.
    fn drain(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.draining {
                state.drain_requested = true;
                return;
            }
            state.draining = true;
        }
        loop {
            let next = {
                let mut state = self.state.lock().unwrap();
                if state.running.len() >= self.limit {
                    None
                } else {
                    state.pending.pop().map(|job| {
                        let exec = state.next_exec;
                        state.next_exec += 1;
                        state.running.insert(
                            job.page.clone(),
                            RunningJob {
                                exec,
                                priority: job.priority,
                                handle: None,
                            },
                        );
                        state.stats.jobs_started += 1;
                        (job, exec)
                    })
                }
            };
            match next {
                Some((job, exec)) => self.start(job, exec),
                None => {
                    let mut state = self.state.lock().unwrap();
                    if state.drain_requested {
                        state.drain_requested = false;
                    } else {
                        state.draining = false;
                        return;
                    }
                }
            }
        }
    }

    /// Invoke the backend for a job already placed in the running set.
    /// Called without the state lock held, so a synchronous settle or a
    /// concurrent cancel cannot deadlock.
    fn start(&self, job: Job, exec: u64) {
        debug!(page = %job.page, priority = job.priority.0, "starting render job");
        let on_settle = self.settle_fn(job.page.clone(), exec);
        let handle = self.backend.render(&job.page, on_settle);

        let mut state = self.state.lock().unwrap();
        match state.running.get_mut(&job.page) {
            Some(running) if running.exec == exec => {
                running.handle = Some(handle);
            }
            // The job settled synchronously or was cancelled while the
            // backend call was in flight; make sure the task is stopped.
            // Abort after settlement is a no-op by contract.
            _ => {
                drop(state);
                handle.abort();
            }
        }
    }

    fn settle_fn(&self, page: PageId, exec: u64) -> SettleFn {
        let weak = self.weak_self.clone();
        Box::new(move |outcome| {
            if let Some(scheduler) = weak.upgrade() {
                scheduler.on_settled(&page, exec, outcome);
            }
        })
    }

    /// Completion path for a started execution. Frees the slot on any
    /// terminal outcome and immediately drains again. Settlements for
    /// executions the scheduler no longer tracks are ignored.
    fn on_settled(&self, page: &str, exec: u64, outcome: RenderOutcome) {
        let settled = {
            let mut state = self.state.lock().unwrap();
            match state.running.get(page) {
                Some(running) if running.exec == exec => {
                    state.running.remove(page);
                    match &outcome {
                        RenderOutcome::Completed => state.stats.jobs_completed += 1,
                        RenderOutcome::Failed(_) => state.stats.jobs_failed += 1,
                        RenderOutcome::Cancelled => state.stats.jobs_cancelled += 1,
                    }
                    true
                }
                _ => false,
            }
        };
        if !settled {
            return;
        }
        match outcome {
            RenderOutcome::Completed => debug!(page, "render job completed"),
            RenderOutcome::Cancelled => debug!(page, "render job aborted by engine"),
            RenderOutcome::Failed(error) => self.errors.render_failed(page, &error),
        }
        self.drain();
    }
}
