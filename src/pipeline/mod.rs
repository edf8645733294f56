//! Export orchestration: state machine, worker thread, weighted progress.

/// Worker-thread export driver.
pub mod orchestrator;
/// Per-phase progress aggregation.
pub mod progress;
