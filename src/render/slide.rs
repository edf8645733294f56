use std::path::Path;

use anyhow::Context as _;
use image::{DynamicImage, ImageFormat};

use crate::cache::entry::{Artifact, ArtifactKind};
use crate::cache::fingerprint::{OpKind, SourceSignature};
use crate::effects::layout::compose_multi_slide;
use crate::encode::gateway::EncodeJob;
use crate::foundation::error::{ReelError, ReelResult};
use crate::media::item::MediaItem;
use crate::render::RenderContext;
use crate::sequence::planner::COMPOSITE_SIZE;
use crate::sequence::slide::{Slide, SlideContent};

const LAYOUT_ID: &str = "main70_previews30";

/// Render (or fetch from cache) the clip for one slide.
#[tracing::instrument(skip_all, fields(slide = slide.ordinal, kind = slide.label()))]
pub fn render_slide(ctx: &RenderContext<'_>, slide: &Slide) -> ReelResult<Artifact> {
    for item in slide.sources() {
        item.ensure_present()?;
    }
    let duration_secs = slide.duration_secs;
    let params = ctx.base_params().with("duration", duration_secs);

    match &slide.content {
        SlideContent::Photo(item) => {
            let key = ctx.key(&SourceSignature::of_item(item)?, OpKind::PhotoSlide, &params);
            ctx.cache.get_or_put(
                &key,
                ArtifactKind::Clip,
                ctx.meta(OpKind::PhotoSlide, item.file_name()),
                |tmp| {
                    ctx.encode(
                        EncodeJob::StillClip {
                            image: item.path.clone(),
                            duration_secs,
                        },
                        tmp,
                    )
                },
            )
        }
        SlideContent::Video(item) => {
            let key = ctx.key(&SourceSignature::of_item(item)?, OpKind::VideoSlide, &params);
            ctx.cache.get_or_put(
                &key,
                ArtifactKind::Clip,
                ctx.meta(OpKind::VideoSlide, item.file_name()),
                |tmp| {
                    ctx.encode(
                        EncodeJob::VideoClip {
                            source: item.path.clone(),
                            duration_secs,
                        },
                        tmp,
                    )
                },
            )
        }
        SlideContent::Composite(items) => {
            let source = SourceSignature::of_items(items)?;
            let params = params.with("layout", LAYOUT_ID);
            let key = ctx.key(&source, OpKind::CompositeSlide, &params);
            ctx.cache.get_or_put(
                &key,
                ArtifactKind::Clip,
                ctx.meta(OpKind::CompositeSlide, describe(items)),
                |tmp| {
                    let still = composite_frame(ctx, items, &source)?;
                    ctx.encode(
                        EncodeJob::StillClip {
                            image: still.path,
                            duration_secs,
                        },
                        tmp,
                    )
                },
            )
        }
    }
}

/// Build (or fetch) the 70/30 composite still for three photos.
fn composite_frame(
    ctx: &RenderContext<'_>,
    items: &[MediaItem; COMPOSITE_SIZE],
    source: &SourceSignature,
) -> ReelResult<Artifact> {
    let params = ctx.base_params().with("layout", LAYOUT_ID);
    let key = ctx.key(source, OpKind::CompositeFrame, &params);
    ctx.cache.get_or_put(
        &key,
        ArtifactKind::Frame,
        ctx.meta(OpKind::CompositeFrame, describe(items)),
        |tmp| {
            let [main, top, bottom] = [
                load_photo(&items[0])?,
                load_photo(&items[1])?,
                load_photo(&items[2])?,
            ];
            let still = compose_multi_slide(&main, [&top, &bottom], ctx.canvas)?;
            save_png(&DynamicImage::ImageRgb8(still), tmp)
        },
    )
}

fn load_photo(item: &MediaItem) -> ReelResult<DynamicImage> {
    item.ensure_present()?;
    image::open(&item.path).map_err(|e| {
        if matches!(
            e,
            image::ImageError::Unsupported(_) | image::ImageError::Decoding(_)
        ) {
            tracing::warn!(photo = %item.file_name(), error = %e, "failed to decode photo");
            ReelError::UnsupportedFormat(item.path.clone())
        } else {
            ReelError::Other(
                anyhow::Error::new(e)
                    .context(format!("failed to load photo '{}'", item.path.display())),
            )
        }
    })
}

fn save_png(img: &DynamicImage, path: &Path) -> ReelResult<()> {
    img.save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("failed to write '{}'", path.display()))?;
    Ok(())
}

fn describe(items: &[MediaItem]) -> String {
    items
        .iter()
        .map(MediaItem::file_name)
        .collect::<Vec<_>>()
        .join(" + ")
}

#[cfg(test)]
#[path = "../../tests/unit/render/slide.rs"]
mod tests;
