//! Priority-ordered pending job queue
//!
//! Holds render jobs that are waiting for a concurrency slot, ordered by
//! priority (smaller value first) with FIFO ordering among equal
//! priorities. Each page id appears at most once: re-inserting an id that
//! is already pending updates its priority and repositions it instead of
//! creating a duplicate.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Stable page identifier used as the job key.
///
/// Unique per document page; the viewer derives it from the page index.
pub type PageId = String;

/// Numeric urgency score. Smaller values dequeue first.
///
/// Derived from the distance between a page region's center and the
/// viewport center, so the page closest to where the user is looking
/// renders first.
#[derive(Debug, Clone, Copy)]
pub struct Priority(pub f64);

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Priority {}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// A pending render job popped from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Page this job renders.
    pub page: PageId,

    /// Urgency at the time it was (last) enqueued.
    pub priority: Priority,

    /// Enqueue sequence number, used only for FIFO tie-breaking.
    seq: u64,
}

impl Job {
    /// Sequence number assigned when the job was first enqueued.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Heap entry; stale entries are discarded lazily on pop.
#[derive(Debug)]
struct HeapEntry {
    priority: Priority,
    seq: u64,
    page: PageId,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed on both keys: BinaryHeap is a max-heap, and we want to
        // pop the smallest priority first, earliest enqueue among ties.
        match other.priority.cmp(&self.priority) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ordering => ordering,
        }
    }
}

/// Pending job queue keyed by page id.
///
/// The heap provides dequeue order; a map holds the authoritative record
/// per page. Updating or removing a job leaves its old heap entry behind,
/// to be skipped when it surfaces.
///
/// # Example
///
/// ```
/// use resume_review_scheduler::{PendingQueue, Priority};
///
/// let mut queue = PendingQueue::new();
/// queue.insert_or_update("page-2".into(), Priority(40.0));
/// queue.insert_or_update("page-1".into(), Priority(10.0));
///
/// // The page nearest the viewport center comes out first.
/// assert_eq!(queue.pop().unwrap().page, "page-1");
/// ```
#[derive(Debug, Default)]
pub struct PendingQueue {
    heap: BinaryHeap<HeapEntry>,
    jobs: HashMap<PageId, (Priority, u64)>,
    next_seq: u64,
}

impl PendingQueue {
    /// Create a new empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job, or update the priority of an already-pending one.
    ///
    /// A new id is assigned the next enqueue sequence number. An existing
    /// id keeps its original sequence number: updating the priority
    /// repositions the job but does not move it behind newer jobs at the
    /// same priority.
    pub fn insert_or_update(&mut self, page: PageId, priority: Priority) {
        let seq = match self.jobs.get(&page) {
            Some(&(_, seq)) => seq,
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                seq
            }
        };
        self.jobs.insert(page.clone(), (priority, seq));
        self.heap.push(HeapEntry {
            priority,
            seq,
            page,
        });
        self.maybe_compact();
    }

    /// Remove and return the job with the smallest priority value, FIFO
    /// among ties. Returns `None` if the queue is empty.
    pub fn pop(&mut self) -> Option<Job> {
        while let Some(entry) = self.heap.pop() {
            match self.jobs.get(&entry.page) {
                Some(&(priority, seq)) if priority == entry.priority && seq == entry.seq => {
                    self.jobs.remove(&entry.page);
                    return Some(Job {
                        page: entry.page,
                        priority,
                        seq,
                    });
                }
                // Stale entry from an earlier priority or a removed job.
                _ => continue,
            }
        }
        None
    }

    /// Remove a pending job. Returns `false` if the id is not pending.
    pub fn remove(&mut self, page: &str) -> bool {
        let removed = self.jobs.remove(page).is_some();
        if removed {
            self.maybe_compact();
        }
        removed
    }

    /// Current priority of a pending job, if any.
    pub fn priority_of(&self, page: &str) -> Option<Priority> {
        self.jobs.get(page).map(|&(priority, _)| priority)
    }

    /// Whether the id is currently pending.
    pub fn contains(&self, page: &str) -> bool {
        self.jobs.contains_key(page)
    }

    /// Number of pending jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the queue has no pending jobs.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Drop all pending jobs.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.jobs.clear();
    }

    /// Rebuild the heap when stale entries dominate it.
    fn maybe_compact(&mut self) {
        if self.heap.len() > self.jobs.len() * 2 + 64 {
            self.heap = self
                .jobs
                .iter()
                .map(|(page, &(priority, seq))| HeapEntry {
                    priority,
                    seq,
                    page: page.clone(),
                })
                .collect();
        }
    }
}
