//! Cache-first renderers for slides and transitions.
//!
//! Each renderer derives a cache key for its output, returns the cached clip on a hit, and
//! otherwise produces the clip through the encoder inside [`CacheStore::put`], so the clip is
//! published before it is returned.
//!
//! Keys are derived under the export's own [`Namespace`], never the store's mutable default, so
//! exports with different profiles can share one store concurrently.

use std::path::Path;

use crate::cache::entry::{EntryMeta, Namespace};
use crate::cache::fingerprint::{Fingerprint, OpKind, OpParams, SourceSignature, fingerprint};
use crate::cache::store::CacheStore;
use crate::encode::gateway::{EncodeJob, EncodeRequest, EncoderGateway};
use crate::encode::profile::EncodingProfile;
use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::ReelResult;

/// Slide clips.
pub mod slide;
/// Transition clips.
pub mod transition;

/// Everything a renderer needs besides the unit itself.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    /// Artifact cache.
    pub cache: &'a CacheStore,
    /// Key scope of this export (its profile identity plus the store's source set).
    pub namespace: &'a Namespace,
    /// External encoder.
    pub encoder: &'a dyn EncoderGateway,
    /// Encoder settings for every clip of this export.
    pub profile: &'a EncodingProfile,
    /// Output canvas, already clamped to the profile.
    pub canvas: Canvas,
    /// Output frame rate, already clamped to the profile.
    pub fps: Fps,
}

impl RenderContext<'_> {
    /// Parameters every clip key includes: output geometry and timing.
    pub(crate) fn base_params(&self) -> OpParams {
        OpParams::new()
            .with("width", self.canvas.width)
            .with("height", self.canvas.height)
            .with("fps_num", self.fps.num)
            .with("fps_den", self.fps.den)
    }

    /// Key for an operation under this export's namespace.
    pub(crate) fn key(
        &self,
        source: &SourceSignature,
        op: OpKind,
        params: &OpParams,
    ) -> Fingerprint {
        fingerprint(source, op, params, &self.namespace.scope_id())
    }

    pub(crate) fn meta(&self, op: OpKind, source: impl Into<String>) -> EntryMeta {
        EntryMeta::new(op, source).in_namespace(self.namespace)
    }

    pub(crate) fn encode(&self, job: EncodeJob<'_>, out: &Path) -> ReelResult<()> {
        let label = job.label();
        let request = EncodeRequest {
            job,
            canvas: self.canvas,
            fps: self.fps,
            profile: self.profile,
        };
        tracing::debug!(job = label, out = %out.display(), "encoding");
        self.encoder.encode(&request, out)?;
        Ok(())
    }
}
