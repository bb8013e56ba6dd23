//! # Progress Tracking
//!
//! Pulled, updated and pushed counters against the run total. Every mutation
//! happens under one lock so completion checks always see a consistent triple.
//! Rendering goes through [`ProgressObserver`] and never feeds back into
//! control flow.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Pipeline stage a progress update belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pull,
    Update,
    Push,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Pull, Stage::Update, Stage::Push];

    fn index(self) -> usize {
        match self {
            Stage::Pull => 0,
            Stage::Update => 1,
            Stage::Push => 2,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Pull => write!(f, "pull"),
            Stage::Update => write!(f, "update"),
            Stage::Push => write!(f, "push"),
        }
    }
}

/// Point-in-time copy of the run state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Records that must be written, including requeued failures
    pub total_expected: u64,
    /// Records the source is expected to yield
    pub source_total: u64,
    pub pulled: u64,
    pub updated: u64,
    pub pushed: u64,
    /// Write failures sent back for another attempt
    pub requeued: u64,
    /// Records dropped after exhausting their write attempts
    pub abandoned: u64,
}

impl ProgressSnapshot {
    /// Work done by a stage; for pushes every rejected attempt is a finished unit
    pub fn count(&self, stage: Stage) -> u64 {
        match stage {
            Stage::Pull => self.pulled,
            Stage::Update => self.updated,
            Stage::Push => self.pushed + self.requeued + self.abandoned,
        }
    }

    /// Total the given stage is measured against
    pub fn stage_total(&self, stage: Stage) -> u64 {
        match stage {
            Stage::Pull | Stage::Update => self.source_total,
            Stage::Push => self.total_expected,
        }
    }

    pub fn is_update_complete(&self) -> bool {
        self.updated >= self.source_total
    }

    /// Every record is written or abandoned
    ///
    /// `total_expected` already includes each requeued attempt, so those
    /// attempts are counted as done alongside successful writes.
    pub fn is_push_complete(&self) -> bool {
        self.count(Stage::Push) >= self.total_expected
    }
}

/// Receives progress after every counter change
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, stage: Stage, snapshot: &ProgressSnapshot);
}

/// Logs each stage whenever it crosses another `step_percent` of its total
#[derive(Debug)]
pub struct LoggingProgressObserver {
    step_percent: u8,
    last_bucket: Mutex<[u64; 3]>,
}

impl LoggingProgressObserver {
    pub fn new(step_percent: u8) -> Self {
        Self {
            step_percent: step_percent.clamp(1, 100),
            last_bucket: Mutex::new([0; 3]),
        }
    }
}

impl ProgressObserver for LoggingProgressObserver {
    fn on_progress(&self, stage: Stage, snapshot: &ProgressSnapshot) {
        let total = snapshot.stage_total(stage);
        if total == 0 {
            return;
        }
        let done = snapshot.count(stage).min(total);
        let bucket = done * 100 / total / u64::from(self.step_percent);

        let mut last = self.last_bucket.lock();
        if bucket <= last[stage.index()] {
            return;
        }
        last[stage.index()] = bucket;
        drop(last);

        info!(
            stage = %stage,
            done = done,
            total = total,
            requeued = snapshot.requeued,
            "PROGRESS: {} {}/{} ({}%)",
            stage,
            done,
            total,
            done * 100 / total
        );
    }
}

/// Shared counters of one run
pub struct ProgressTracker {
    state: Mutex<ProgressSnapshot>,
    observer: Option<Arc<dyn ProgressObserver>>,
    halted: AtomicBool,
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("state", &*self.state.lock())
            .field("halted", &self.is_halted())
            .finish()
    }
}

impl ProgressTracker {
    pub fn new(total: u64, observer: Option<Arc<dyn ProgressObserver>>) -> Self {
        Self {
            state: Mutex::new(ProgressSnapshot {
                total_expected: total,
                source_total: total,
                ..ProgressSnapshot::default()
            }),
            observer,
            halted: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        *self.state.lock()
    }

    fn mutate(&self, stage: Stage, change: impl FnOnce(&mut ProgressSnapshot)) -> ProgressSnapshot {
        let snapshot = {
            let mut state = self.state.lock();
            change(&mut state);
            *state
        };
        if let Some(observer) = &self.observer {
            observer.on_progress(stage, &snapshot);
        }
        snapshot
    }

    /// Count a fetched page; grows the totals if the source yields more than counted
    pub fn record_pulled(&self, count: u64) -> ProgressSnapshot {
        self.mutate(Stage::Pull, |state| {
            state.pulled += count;
            if state.pulled > state.source_total {
                let excess = state.pulled - state.source_total;
                state.source_total += excess;
                state.total_expected += excess;
            }
        })
    }

    pub fn record_updated(&self, count: u64) -> ProgressSnapshot {
        self.mutate(Stage::Update, |state| state.updated += count)
    }

    /// Apply one write-back outcome atomically
    ///
    /// Requeued records are added to the total before they re-enter the queue,
    /// so no pusher can observe completion while they are still in flight.
    pub fn record_push_outcome(&self, written: u64, requeued: u64, abandoned: u64) -> ProgressSnapshot {
        self.mutate(Stage::Push, |state| {
            state.pushed += written;
            state.requeued += requeued;
            state.total_expected += requeued;
            state.abandoned += abandoned;
        })
    }

    /// Shrink the totals once the source is exhausted with fewer records than counted
    pub fn reconcile_source_total(&self) -> ProgressSnapshot {
        self.mutate(Stage::Pull, |state| {
            if state.pulled < state.source_total {
                let missing = state.source_total - state.pulled;
                warn!(
                    expected = state.source_total,
                    pulled = state.pulled,
                    "PROGRESS: Source exhausted early, lowering run total by {}",
                    missing
                );
                state.source_total -= missing;
                state.total_expected -= missing;
            }
        })
    }

    /// Stop every worker loop at its next check
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    struct RecordingObserver {
        events: Mutex<Vec<(Stage, ProgressSnapshot)>>,
    }

    impl ProgressObserver for RecordingObserver {
        fn on_progress(&self, stage: Stage, snapshot: &ProgressSnapshot) {
            self.events.lock().push((stage, *snapshot));
        }
    }

    #[test]
    fn test_counters_and_completion() {
        let tracker = ProgressTracker::new(25, None);
        tracker.record_pulled(10);
        tracker.record_pulled(15);
        tracker.record_updated(25);
        assert!(tracker.snapshot().is_update_complete());
        assert!(!tracker.snapshot().is_push_complete());

        tracker.record_push_outcome(25, 0, 0);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.pushed, 25);
        assert!(snapshot.is_push_complete());
    }

    #[test]
    fn test_requeued_failures_grow_total() {
        let tracker = ProgressTracker::new(10, None);
        let snapshot = tracker.record_push_outcome(8, 2, 0);

        assert_eq!(snapshot.total_expected, 12);
        assert_eq!(snapshot.source_total, 10);
        assert!(!snapshot.is_push_complete());

        let snapshot = tracker.record_push_outcome(1, 0, 0);
        assert!(!snapshot.is_push_complete());

        let snapshot = tracker.record_push_outcome(1, 0, 0);
        assert_eq!(snapshot.pushed, 10);
        assert_eq!(snapshot.count(Stage::Push), 12);
        assert!(snapshot.is_push_complete());
    }

    #[test]
    fn test_abandoned_records_count_towards_completion() {
        let tracker = ProgressTracker::new(3, None);
        tracker.record_push_outcome(2, 0, 1);
        assert!(tracker.snapshot().is_push_complete());
    }

    #[test]
    fn test_reconcile_shrinks_and_pull_grows_totals() {
        let tracker = ProgressTracker::new(10, None);
        tracker.record_pulled(7);
        let snapshot = tracker.reconcile_source_total();
        assert_eq!(snapshot.source_total, 7);
        assert_eq!(snapshot.total_expected, 7);

        let tracker = ProgressTracker::new(5, None);
        let snapshot = tracker.record_pulled(6);
        assert_eq!(snapshot.source_total, 6);
        assert_eq!(snapshot.total_expected, 6);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let tracker = Arc::new(ProgressTracker::new(8000, None));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        tracker.record_updated(1);
                        tracker.record_push_outcome(1, 0, 0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.updated, 8000);
        assert_eq!(snapshot.pushed, 8000);
    }

    #[test]
    fn test_observer_sees_every_change() {
        let observer = Arc::new(RecordingObserver {
            events: Mutex::new(Vec::new()),
        });
        let tracker = ProgressTracker::new(4, Some(observer.clone() as Arc<dyn ProgressObserver>));

        tracker.record_pulled(4);
        tracker.record_updated(4);
        tracker.record_push_outcome(4, 0, 0);

        let events = observer.events.lock();
        let stages: Vec<Stage> = events.iter().map(|(stage, _)| *stage).collect();
        assert_eq!(stages, vec![Stage::Pull, Stage::Update, Stage::Push]);
        assert_eq!(events[2].1.pushed, 4);
    }

    #[test]
    fn test_halt_flag() {
        let tracker = ProgressTracker::new(1, None);
        assert!(!tracker.is_halted());
        tracker.halt();
        assert!(tracker.is_halted());
    }
}
