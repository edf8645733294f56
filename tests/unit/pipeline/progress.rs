use std::sync::mpsc;

use super::*;

#[test]
fn empty_tracker_reports_zero() {
    let mut t = ProgressTracker::new();
    assert_eq!(t.fraction(), 0.0);
    assert!(!t.state().cancelled);
}

#[test]
fn units_weigh_the_same_across_phases() {
    let mut t = ProgressTracker::new();
    t.set_total(Phase::Discovery, 2);
    t.set_total(Phase::SlideRender, 2);
    t.advance(Phase::Discovery, 2);
    assert!((t.fraction() - 0.5).abs() < 1e-12);
    t.advance(Phase::SlideRender, 1);
    assert!((t.fraction() - 0.75).abs() < 1e-12);
}

#[test]
fn one_only_when_every_unit_is_done() {
    let mut t = ProgressTracker::new();
    t.set_total(Phase::SlideRender, 1_000_000);
    t.set_total(Phase::Assembly, 1);
    t.advance(Phase::SlideRender, 1_000_000);
    let f = t.fraction();
    assert!(f < 1.0, "{f}");
    assert_eq!(t.advance(Phase::Assembly, 1), 1.0);
}

#[test]
fn advance_saturates_at_total() {
    let mut t = ProgressTracker::new();
    t.set_total(Phase::TransitionRender, 3);
    t.advance(Phase::TransitionRender, 10);
    assert_eq!(
        t.state().phase(Phase::TransitionRender),
        PhaseCounts {
            completed: 3,
            total: 3
        }
    );
}

#[test]
fn estimate_correction_never_moves_backwards() {
    let mut t = ProgressTracker::new();
    t.set_total(Phase::Discovery, 4);
    t.set_total(Phase::SlideRender, 4);
    t.advance(Phase::Discovery, 4);
    let before = t.fraction();
    assert!((before - 0.5).abs() < 1e-12);

    // Sequencing found more slides than estimated.
    t.set_total(Phase::SlideRender, 12);
    t.set_total(Phase::TransitionRender, 11);
    assert_eq!(t.fraction(), before);

    t.advance(Phase::SlideRender, 1);
    assert_eq!(t.fraction(), before);
    for _ in 0..11 {
        t.advance(Phase::SlideRender, 1);
    }
    t.advance(Phase::TransitionRender, 11);
    assert_eq!(t.fraction(), 1.0);
}

#[test]
fn shrinking_total_clamps_completed() {
    let mut t = ProgressTracker::new();
    t.set_total(Phase::SlideRender, 5);
    t.advance(Phase::SlideRender, 4);
    t.set_total(Phase::SlideRender, 2);
    assert_eq!(t.state().phase(Phase::SlideRender).completed, 2);
    assert_eq!(t.fraction(), 1.0);
}

#[test]
fn cancellation_is_recorded() {
    let mut t = ProgressTracker::new();
    t.mark_cancelled();
    assert!(t.state().cancelled);
}

#[test]
fn reporter_emits_an_event_per_advance() {
    let (tx, rx) = mpsc::channel();
    let r = ProgressReporter::new(tx);
    r.set_total(Phase::SlideRender, 2);
    r.advance(Phase::SlideRender, 1);
    r.advance(Phase::SlideRender, 1);
    drop(r);

    let events: Vec<ProgressEvent> = rx
        .iter()
        .map(|e| match e {
            ExportEvent::Progress(p) => p,
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].completed, 1);
    assert!((events[0].fraction - 0.5).abs() < 1e-12);
    assert_eq!(events[1].fraction, 1.0);
}

#[test]
fn reporter_tolerates_a_dropped_receiver() {
    let (tx, rx) = mpsc::channel();
    drop(rx);
    let r = ProgressReporter::new(tx);
    r.set_total(Phase::Assembly, 1);
    r.advance(Phase::Assembly, 1);
    assert_eq!(r.state().fraction, 1.0);
}
