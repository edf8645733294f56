//! Deterministic CPU image effects: composite layouts and transition frames.

/// Directional paper fold.
pub mod fold;
/// 70/30 composite slide layout.
pub mod layout;
/// Transition parameters and cross-fade.
pub mod transitions;
