//! slidereel turns a folder of photos and video clips into one slideshow video.
//!
//! Every slide and transition is rendered into a content-addressed cache, so re-exporting after
//! a small change only re-encodes what changed. The entry point is [`Exporter::export`] (or the
//! [`export`] shortcut), which runs on a worker thread and streams [`ExportEvent`]s:
//!
//! - discover and sequence media into [`Slide`]s
//! - render slide and transition clips through an [`EncoderGateway`]
//! - assemble the clips with an optional soundtrack
#![forbid(unsafe_code)]

mod foundation;

#[cfg(test)]
#[path = "../tests/unit/support.rs"]
mod test_support;

/// Easing curves.
pub mod animation;
/// Concatenation, soundtrack, output metadata.
pub mod assemble;
/// Content-addressable artifact cache.
pub mod cache;
/// JSON configuration.
pub mod config;
/// CPU image effects.
pub mod effects;
/// External encoder boundary.
pub mod encode;
/// Media discovery.
pub mod media;
/// Export orchestration.
pub mod pipeline;
/// Cache-first clip renderers.
pub mod render;
/// Slide sequencing.
pub mod sequence;

pub use crate::foundation::cancel::CancelToken;
pub use crate::foundation::core::{Canvas, Fps, Placement};
pub use crate::foundation::error::{ErrorKind, ReelError, ReelResult, UnitLabel};

pub use crate::animation::ease::Ease;
pub use crate::assemble::metadata::{OutputMetadata, SegmentKind, SegmentRecord};
pub use crate::assemble::{Assembled, Assembler, Segment};
pub use crate::cache::entry::{
    Artifact, ArtifactKind, CacheEntry, CacheStats, EntryMeta, InvalidationScope, Namespace,
};
pub use crate::cache::fingerprint::{
    Fingerprint, OpKind, OpParams, ParamValue, SourceSignature, fingerprint,
};
pub use crate::cache::store::CacheStore;
pub use crate::config::ExportConfig;
pub use crate::effects::transitions::{FoldDir, TransitionKind, TransitionSpec};
pub use crate::encode::ffmpeg::{FfmpegGateway, is_ffmpeg_on_path};
pub use crate::encode::gateway::{
    EncodeJob, EncodeRequest, EncoderError, EncoderGateway, FramePosition, FrameSource, MediaInfo,
};
pub use crate::encode::profile::EncodingProfile;
pub use crate::media::discover::discover_media;
pub use crate::media::item::{MediaItem, MediaKind};
pub use crate::pipeline::orchestrator::{
    ExportEvent, ExportHandle, ExportState, ExportStateMachine, Exporter, MediaInput, Outcome,
    RenderThreading, export,
};
pub use crate::pipeline::progress::{
    Phase, PhaseCounts, ProgressEvent, ProgressState, ProgressTracker,
};
pub use crate::render::RenderContext;
pub use crate::sequence::planner::{SlidePlan, plan_slides};
pub use crate::sequence::slide::{
    SequenceSettings, Slide, SlideContent, SlideKind, SlideSequence, sequence_slides,
};
