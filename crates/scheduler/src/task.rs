//! Boundary with the external rendering engine
//!
//! The scheduler never talks to the page renderer directly; it calls an
//! injected [`RenderBackend`] and receives an abort handle plus exactly
//! one tagged settlement per started job. Cancellation is its own
//! outcome, so the scheduler never has to tell an expected abort apart
//! from a real failure by inspecting error text.

use thiserror::Error;

/// Failure surfaced by the rendering engine for a single page.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The page content could not be decoded.
    #[error("page decode failed: {0}")]
    Decode(String),

    /// Any other engine-side failure while painting the page.
    #[error("render engine failure: {0}")]
    Engine(String),
}

/// Terminal settlement of a render task, delivered exactly once.
#[derive(Debug)]
pub enum RenderOutcome {
    /// The page rendered to completion.
    Completed,

    /// The task was aborted before completion. Expected during scrolling;
    /// never treated as an error.
    Cancelled,

    /// The engine failed to render the page.
    Failed(RenderError),
}

/// Completion callback handed to the backend when a job starts.
///
/// The backend must invoke it exactly once, possibly synchronously from
/// within [`RenderBackend::render`] itself.
pub type SettleFn = Box<dyn FnOnce(RenderOutcome) + Send + 'static>;

/// Abort hook for an in-flight render task.
///
/// `abort` may be called at any time after [`RenderBackend::render`]
/// returns, from any thread, and must be a no-op once the task has
/// settled.
pub trait RenderHandle: Send {
    /// Ask the engine to stop producing pixels for this task.
    fn abort(&self);
}

/// External rendering engine seam.
///
/// `render` begins pixel production for a page and returns immediately;
/// the scheduler only decides *when* it is called and when the returned
/// handle is aborted. The engine's own internal concurrency is its own
/// business.
pub trait RenderBackend: Send + Sync {
    /// Start rendering `page`, reporting the result through `on_settle`.
    fn render(&self, page: &str, on_settle: SettleFn) -> Box<dyn RenderHandle>;
}
