use std::sync::Mutex;
use std::sync::mpsc::Sender;

use crate::pipeline::orchestrator::ExportEvent;

/// Export phases, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Stat and classify media.
    Discovery,
    /// Render slide clips.
    SlideRender,
    /// Render transition clips.
    TransitionRender,
    /// Concatenate, mux, publish.
    Assembly,
}

impl Phase {
    /// Every phase, in order.
    pub const ALL: [Phase; 4] = [
        Phase::Discovery,
        Phase::SlideRender,
        Phase::TransitionRender,
        Phase::Assembly,
    ];

    fn index(self) -> usize {
        match self {
            Self::Discovery => 0,
            Self::SlideRender => 1,
            Self::TransitionRender => 2,
            Self::Assembly => 3,
        }
    }
}

/// Completed and total units of one phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct PhaseCounts {
    /// Units finished.
    pub completed: u64,
    /// Units expected.
    pub total: u64,
}

/// Snapshot of export progress.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct ProgressState {
    /// Per-phase counts, indexed like [`Phase::ALL`].
    pub phases: [PhaseCounts; 4],
    /// Overall completion in `[0, 1]`, never decreasing.
    pub fraction: f64,
    /// Whether cancellation was requested.
    pub cancelled: bool,
}

impl ProgressState {
    /// Counts for `phase`.
    pub fn phase(&self, phase: Phase) -> PhaseCounts {
        self.phases[phase.index()]
    }
}

/// Weighted progress over all phases.
///
/// Every unit weighs the same regardless of phase, so a phase's share of the bar is proportional
/// to its unit count. Totals of later phases are estimates until they are known exactly; the
/// reported fraction is clamped so it never goes backwards when an estimate is corrected.
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    phases: [PhaseCounts; 4],
    reported: f64,
    cancelled: bool,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    /// Tracker with every phase empty.
    pub fn new() -> Self {
        Self {
            phases: [PhaseCounts::default(); 4],
            reported: 0.0,
            cancelled: false,
        }
    }

    /// Set the expected unit count of `phase`.
    ///
    /// Completed units above the new total are kept at the total.
    pub fn set_total(&mut self, phase: Phase, total: u64) {
        let counts = &mut self.phases[phase.index()];
        counts.total = total;
        counts.completed = counts.completed.min(total);
    }

    /// Mark `units` more units of `phase` as finished, saturating at the phase total.
    pub fn advance(&mut self, phase: Phase, units: u64) -> f64 {
        let counts = &mut self.phases[phase.index()];
        counts.completed = counts.completed.saturating_add(units).min(counts.total);
        self.fraction()
    }

    /// Record a cancellation request.
    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// Current overall fraction. Monotonically non-decreasing across calls.
    pub fn fraction(&mut self) -> f64 {
        let (done, total) = self
            .phases
            .iter()
            .fold((0u64, 0u64), |(d, t), p| (d + p.completed, t + p.total));
        let raw = if total == 0 {
            0.0
        } else if done == total {
            1.0
        } else {
            // Never round up to exactly 1.0 while work is outstanding.
            (done as f64 / total as f64).min(1.0 - f64::EPSILON)
        };
        self.reported = self.reported.max(raw);
        self.reported
    }

    /// Snapshot of every counter.
    pub fn state(&mut self) -> ProgressState {
        ProgressState {
            phases: self.phases,
            fraction: self.fraction(),
            cancelled: self.cancelled,
        }
    }
}

/// Progress report sent to the caller after every change.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct ProgressEvent {
    /// Phase that advanced.
    pub phase: Phase,
    /// Units finished in that phase.
    pub completed: u64,
    /// Units expected in that phase.
    pub total: u64,
    /// Overall completion.
    pub fraction: f64,
}

/// Thread-safe tracker that publishes each change as an [`ExportEvent::Progress`].
pub(crate) struct ProgressReporter {
    tracker: Mutex<ProgressTracker>,
    events: Sender<ExportEvent>,
}

impl ProgressReporter {
    pub(crate) fn new(events: Sender<ExportEvent>) -> Self {
        Self {
            tracker: Mutex::new(ProgressTracker::new()),
            events,
        }
    }

    pub(crate) fn set_total(&self, phase: Phase, total: u64) {
        self.lock().set_total(phase, total);
    }

    pub(crate) fn advance(&self, phase: Phase, units: u64) {
        let event = {
            let mut tracker = self.lock();
            let fraction = tracker.advance(phase, units);
            let counts = tracker.phases[phase.index()];
            ProgressEvent {
                phase,
                completed: counts.completed,
                total: counts.total,
                fraction,
            }
        };
        // A dropped receiver only means nobody is listening.
        let _ = self.events.send(ExportEvent::Progress(event));
    }

    pub(crate) fn mark_cancelled(&self) {
        self.lock().mark_cancelled();
    }

    pub(crate) fn state(&self) -> ProgressState {
        self.lock().state()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressTracker> {
        self.tracker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/progress.rs"]
mod tests;
