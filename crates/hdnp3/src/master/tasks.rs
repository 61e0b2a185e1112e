// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Master task queue.
//!
//! Tasks are ordered by `(ready_at ASC, priority DESC)`: the earliest-due
//! task runs first, and among tasks due at the same instant the higher
//! priority wins. Periodic scans carry shared state (period, enabled,
//! demand) that the task processor consults when rescheduling; a raised
//! demand flag makes the scan ready immediately.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Which data classes a scan or unsolicited mask covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassMask {
    /// Class 0: all static data.
    pub class0: bool,
    /// Class 1 events.
    pub class1: bool,
    /// Class 2 events.
    pub class2: bool,
    /// Class 3 events.
    pub class3: bool,
}

impl ClassMask {
    /// Every class.
    #[must_use]
    pub fn all() -> Self {
        Self {
            class0: true,
            class1: true,
            class2: true,
            class3: true,
        }
    }

    /// Only the event classes (1..=3).
    #[must_use]
    pub fn events() -> Self {
        Self {
            class0: false,
            class1: true,
            class2: true,
            class3: true,
        }
    }

    /// No classes.
    #[must_use]
    pub fn none() -> Self {
        Self {
            class0: false,
            class1: false,
            class2: false,
            class3: false,
        }
    }
}

/// What a queued task does when it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// Read all static data and drain all event classes.
    IntegrityScan,
    /// Read the selected classes.
    ClassScan(ClassMask),
    /// Read a specific group/variation over an index range.
    RangeScan {
        /// Object group.
        group: u8,
        /// Object variation.
        variation: u8,
        /// First point index.
        start: u16,
        /// Last point index (inclusive).
        stop: u16,
    },
    /// Write the current time to the outstation (group 50 var 1).
    TimeSync,
    /// Clear the outstation's restart indication (group 80 var 1).
    ClearRestart,
    /// Disable unsolicited reporting for the masked classes.
    DisableUnsolicited(ClassMask),
    /// Enable unsolicited reporting for the masked classes.
    EnableUnsolicited(ClassMask),
}

/// Shared state of a periodic scan.
#[derive(Debug)]
pub struct ScanState {
    /// Interval between runs.
    pub period: Duration,
    enabled: AtomicBool,
    demand: AtomicBool,
}

impl ScanState {
    /// New enabled scan with the given period.
    #[must_use]
    pub fn new(period: Duration) -> Arc<Self> {
        Arc::new(Self {
            period,
            enabled: AtomicBool::new(true),
            demand: AtomicBool::new(false),
        })
    }

    /// Whether the scan may run.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enable or disable the scan.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Request an immediate run ahead of the period.
    pub fn demand(&self) {
        self.demand.store(true, Ordering::Release);
    }

    /// Consume the demand flag.
    pub fn take_demand(&self) -> bool {
        self.demand.swap(false, Ordering::AcqRel)
    }

    /// Whether a demand is pending.
    #[must_use]
    pub fn demand_pending(&self) -> bool {
        self.demand.load(Ordering::Acquire)
    }
}

/// A schedulable unit of master work.
#[derive(Debug, Clone)]
pub struct Task {
    /// Larger runs first among tasks due at the same time.
    pub priority: i32,
    /// Earliest instant the task may run.
    pub ready_at: Instant,
    /// What to do.
    pub kind: TaskKind,
    /// Present on periodic scans; the processor reschedules through it.
    pub scan: Option<Arc<ScanState>>,
}

impl Task {
    /// A one-shot task ready immediately.
    #[must_use]
    pub fn one_shot(kind: TaskKind, priority: i32) -> Self {
        Self {
            priority,
            ready_at: Instant::now(),
            kind,
            scan: None,
        }
    }
}

struct QueuedTask(Task);

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap is a max-heap: invert ready_at so the earliest due task
        // surfaces first; break ties by higher priority.
        other
            .0
            .ready_at
            .cmp(&self.0.ready_at)
            .then(self.0.priority.cmp(&other.0.priority))
    }
}

/// Priority + ready-time task queue.
#[derive(Default)]
pub struct TaskQueue {
    heap: Mutex<BinaryHeap<QueuedTask>>,
}

impl TaskQueue {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task.
    pub fn enqueue(&self, task: Task) {
        self.heap.lock().push(QueuedTask(task));
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Pop the next task due at or before `now`.
    ///
    /// A queued periodic scan with a pending demand is due immediately,
    /// regardless of its scheduled time.
    pub fn next_ready(&self, now: Instant) -> Option<Task> {
        let mut heap = self.heap.lock();

        let due = heap.peek().is_some_and(|q| q.0.ready_at <= now);
        if due {
            return heap.pop().map(|q| q.0);
        }

        // Demand overrides the schedule; the heap is small, scan it.
        let demanded = heap
            .iter()
            .any(|q| q.0.scan.as_ref().is_some_and(|s| s.demand_pending()));
        if demanded {
            let mut tasks: Vec<Task> = std::mem::take(&mut *heap).into_iter().map(|q| q.0).collect();
            let pos = tasks
                .iter()
                .position(|t| t.scan.as_ref().is_some_and(|s| s.demand_pending()));
            let task = pos.map(|p| tasks.swap_remove(p));
            if let Some(scan) = task.as_ref().and_then(|t| t.scan.as_ref()) {
                // The demand is served by this pop; a fresh demand raised
                // while the task runs still reschedules it immediately.
                scan.take_demand();
            }
            heap.extend(tasks.into_iter().map(QueuedTask));
            return task;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earliest_ready_at_first() {
        let queue = TaskQueue::new();
        let now = Instant::now();

        queue.enqueue(Task {
            priority: 0,
            ready_at: now + Duration::from_millis(20),
            kind: TaskKind::IntegrityScan,
            scan: None,
        });
        queue.enqueue(Task {
            priority: 0,
            ready_at: now,
            kind: TaskKind::ClassScan(ClassMask::events()),
            scan: None,
        });

        let first = queue.next_ready(now).expect("due task");
        assert_eq!(first.kind, TaskKind::ClassScan(ClassMask::events()));

        // The integrity scan is not due yet
        assert!(queue.next_ready(now).is_none());
        assert!(queue
            .next_ready(now + Duration::from_millis(30))
            .is_some());
    }

    #[test]
    fn test_priority_breaks_ties() {
        let queue = TaskQueue::new();
        let now = Instant::now();

        queue.enqueue(Task {
            priority: 1,
            ready_at: now,
            kind: TaskKind::ClassScan(ClassMask::events()),
            scan: None,
        });
        queue.enqueue(Task {
            priority: 10,
            ready_at: now,
            kind: TaskKind::IntegrityScan,
            scan: None,
        });

        let first = queue.next_ready(now).expect("due");
        assert_eq!(first.kind, TaskKind::IntegrityScan);
        let second = queue.next_ready(now).expect("due");
        assert_eq!(second.kind, TaskKind::ClassScan(ClassMask::events()));
    }

    #[test]
    fn test_empty_queue_returns_none() {
        let queue = TaskQueue::new();
        assert!(queue.next_ready(Instant::now()).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_demand_overrides_schedule() {
        let queue = TaskQueue::new();
        let now = Instant::now();
        let scan = ScanState::new(Duration::from_secs(3600));

        queue.enqueue(Task {
            priority: 0,
            ready_at: now + Duration::from_secs(3600),
            kind: TaskKind::IntegrityScan,
            scan: Some(scan.clone()),
        });

        assert!(queue.next_ready(now).is_none());

        scan.demand();
        let task = queue.next_ready(now).expect("demanded task is due");
        assert_eq!(task.kind, TaskKind::IntegrityScan);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_scan_state_flags() {
        let scan = ScanState::new(Duration::from_secs(1));
        assert!(scan.is_enabled());

        scan.set_enabled(false);
        assert!(!scan.is_enabled());

        assert!(!scan.take_demand());
        scan.demand();
        assert!(scan.demand_pending());
        assert!(scan.take_demand());
        assert!(!scan.take_demand(), "demand is consumed");
    }
}
