//! Turning a flat media list into slides.

/// Pure single-vs-composite grouping over media kinds.
pub mod planner;
/// Slide descriptors and duration rules.
pub mod slide;
