use anyhow::Context as _;

use crate::cache::entry::{Artifact, ArtifactKind};
use crate::cache::fingerprint::{OpKind, OpParams, SourceSignature};
use crate::effects::layout::fit_to_cell;
use crate::effects::transitions::TransitionSpec;
use crate::encode::gateway::{EncodeJob, FramePosition, FrameSource};
use crate::foundation::core::Canvas;
use crate::foundation::error::{ReelError, ReelResult};
use crate::render::RenderContext;

/// Render (or fetch from cache) the transition clip between two rendered slide clips.
///
/// The key derives from the two clip keys plus the transition parameters, so it changes whenever
/// either neighbor changes.
#[tracing::instrument(skip_all, fields(transition = ordinal, kind = spec.kind.id()))]
pub fn render_transition(
    ctx: &RenderContext<'_>,
    spec: &TransitionSpec,
    ordinal: usize,
    from: &Artifact,
    to: &Artifact,
) -> ReelResult<Artifact> {
    let source = SourceSignature::Derived {
        inputs: vec![from.key, to.key],
    };
    let params = ctx.base_params().merged(&spec.op_params());
    let key = ctx.key(&source, OpKind::Transition, &params);
    ctx.cache.get_or_put(
        &key,
        ArtifactKind::Clip,
        ctx.meta(
            OpKind::Transition,
            format!("{} -> {}", short(from), short(to)),
        ),
        |tmp| {
            let last = boundary_frame(ctx, from, FramePosition::Last)?;
            let first = boundary_frame(ctx, to, FramePosition::First)?;
            let frames = TransitionFrames {
                spec: *spec,
                from: load_canvas_rgb(&last, ctx.canvas)?,
                to: load_canvas_rgb(&first, ctx.canvas)?,
                size: (ctx.canvas.width, ctx.canvas.height),
                count: spec.frame_count(ctx.fps),
            };
            ctx.encode(EncodeJob::FrameSequence { frames: &frames }, tmp)
        },
    )
}

/// Extract (or fetch) the first or last frame of `clip` as a PNG.
fn boundary_frame(
    ctx: &RenderContext<'_>,
    clip: &Artifact,
    position: FramePosition,
) -> ReelResult<Artifact> {
    let which = match position {
        FramePosition::First => "first",
        FramePosition::Last => "last",
    };
    let source = SourceSignature::Derived {
        inputs: vec![clip.key],
    };
    let key = ctx.key(
        &source,
        OpKind::BoundaryFrame,
        &OpParams::new().with("position", which),
    );
    ctx.cache.get_or_put(
        &key,
        ArtifactKind::Frame,
        ctx.meta(OpKind::BoundaryFrame, format!("{which} of {}", short(clip))),
        |tmp| {
            ctx.encode(
                EncodeJob::ExtractFrame {
                    source: clip.path.clone(),
                    position,
                },
                tmp,
            )
        },
    )
}

/// Decode a frame artifact as canvas-sized RGB24, letterboxing if its size differs.
fn load_canvas_rgb(frame: &Artifact, canvas: Canvas) -> ReelResult<Vec<u8>> {
    let img = image::open(&frame.path)
        .with_context(|| format!("failed to decode frame '{}'", frame.path.display()))?;
    if img.width() == canvas.width && img.height() == canvas.height {
        return Ok(img.to_rgb8().into_raw());
    }
    Ok(fit_to_cell(&img, canvas.width, canvas.height).into_raw())
}

fn short(a: &Artifact) -> String {
    a.key.to_hex()[..12].to_owned()
}

/// Frames of one transition, generated on demand while the encoder consumes them.
struct TransitionFrames {
    spec: TransitionSpec,
    from: Vec<u8>,
    to: Vec<u8>,
    size: (u32, u32),
    count: u32,
}

impl FrameSource for TransitionFrames {
    fn frame_count(&self) -> u32 {
        self.count
    }

    fn render_frame(&self, index: u32, rgb: &mut [u8]) -> ReelResult<()> {
        if index >= self.count {
            return Err(ReelError::validation(format!(
                "transition frame {index} out of range (count {})",
                self.count
            )));
        }
        self.spec
            .render_frame(rgb, &self.from, &self.to, self.size, index, self.count)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/transition.rs"]
mod tests;
