//! Encoding boundary.
//!
//! Everything that shells out to the external encoder goes through [`gateway::EncoderGateway`],
//! so the pipeline can be driven by a fake in tests.

/// `ffmpeg`-backed gateway.
pub mod ffmpeg;
/// Gateway trait and request types.
pub mod gateway;
/// Encoder presets.
pub mod profile;
