use crate::encode::gateway::EncoderError;
use crate::foundation::error::{ReelError, ReelResult};
use crate::media::item::{MediaItem, MediaKind};
use crate::sequence::planner::{COMPOSITE_SIZE, SlidePlan, plan_slides};

/// What a slide shows.
#[derive(Clone, Debug, PartialEq)]
pub enum SlideContent {
    /// One still photo.
    Photo(MediaItem),
    /// One video clip.
    Video(MediaItem),
    /// Main photo plus two previews in a 70/30 layout.
    Composite([MediaItem; COMPOSITE_SIZE]),
}

/// Single or composite grouping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideKind {
    /// One source item.
    Single,
    /// Three source photos.
    Composite3,
}

/// One entry of the rendered slideshow, immutable once sequenced.
#[derive(Clone, Debug, PartialEq)]
pub struct Slide {
    /// Position in the slideshow (0-based).
    pub ordinal: usize,
    /// Nominal on-screen duration in seconds.
    pub duration_secs: f64,
    /// Source media.
    pub content: SlideContent,
}

impl Slide {
    /// Single or composite.
    pub fn kind(&self) -> SlideKind {
        match self.content {
            SlideContent::Composite(_) => SlideKind::Composite3,
            SlideContent::Photo(_) | SlideContent::Video(_) => SlideKind::Single,
        }
    }

    /// Source items, in display order.
    pub fn sources(&self) -> &[MediaItem] {
        match &self.content {
            SlideContent::Photo(item) | SlideContent::Video(item) => std::slice::from_ref(item),
            SlideContent::Composite(items) => items,
        }
    }

    /// Unit kind used in error reports and logs.
    pub fn label(&self) -> &'static str {
        match self.content {
            SlideContent::Photo(_) => "photo slide",
            SlideContent::Video(_) => "video slide",
            SlideContent::Composite(_) => "composite slide",
        }
    }
}

/// Duration rules applied while sequencing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SequenceSettings {
    /// Seconds each photo or composite slide stays on screen.
    pub photo_duration: f64,
    /// `0` skips videos, `-1` keeps their full length, a positive value caps them. The final
    /// item always keeps its full length.
    pub video_duration: f64,
    /// Emit a composite after this many single photos, `<= 0` disables composites.
    pub multi_slide_frequency: i32,
}

/// Sequencer output.
#[derive(Clone, Debug, Default)]
pub struct SlideSequence {
    /// Slides in display order.
    pub slides: Vec<Slide>,
    /// Non-fatal problems (unprobeable videos) worth reporting.
    pub warnings: Vec<String>,
}

/// Turn sorted media into slides.
///
/// `video_length` reports a video's full duration. It is only consulted when a video is kept.
pub fn sequence_slides<F>(
    items: &[MediaItem],
    settings: &SequenceSettings,
    mut video_length: F,
) -> ReelResult<SlideSequence>
where
    F: FnMut(&MediaItem) -> Result<f64, EncoderError>,
{
    if !settings.photo_duration.is_finite() || settings.photo_duration <= 0.0 {
        return Err(ReelError::validation("photo_duration must be > 0"));
    }

    let last_index = items.len().checked_sub(1);
    let mut out = SlideSequence::default();

    // Videos removed by `video_duration == 0` never reach the planner, so they cannot split a
    // photo run.
    let mut kept = Vec::with_capacity(items.len());
    let mut video_secs = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        if item.kind == MediaKind::Photo {
            kept.push(item);
            video_secs.push(0.0);
            continue;
        }
        if settings.video_duration == 0.0 {
            tracing::debug!(video = %item.file_name(), "skipping video (video_duration = 0)");
            continue;
        }
        let full = match video_length(item) {
            Ok(secs) => secs,
            Err(e) if settings.video_duration > 0.0 => {
                out.warnings.push(format!(
                    "could not read duration of '{}' ({e}), using {}s",
                    item.file_name(),
                    settings.video_duration
                ));
                settings.video_duration
            }
            Err(e) => return Err(ReelError::Encoder(e).in_unit(idx, "video duration probe")),
        };
        let secs = if settings.video_duration < 0.0 || Some(idx) == last_index {
            full
        } else {
            settings.video_duration.min(full)
        };
        kept.push(item);
        video_secs.push(secs);
    }

    let kinds: Vec<MediaKind> = kept.iter().map(|i| i.kind).collect();
    for (ordinal, step) in plan_slides(&kinds, settings.multi_slide_frequency)
        .into_iter()
        .enumerate()
    {
        let slide = match step {
            SlidePlan::Single(i) => match kept[i].kind {
                MediaKind::Photo => Slide {
                    ordinal,
                    duration_secs: settings.photo_duration,
                    content: SlideContent::Photo(kept[i].clone()),
                },
                MediaKind::Video => Slide {
                    ordinal,
                    duration_secs: video_secs[i],
                    content: SlideContent::Video(kept[i].clone()),
                },
            },
            SlidePlan::Composite([a, b, c]) => Slide {
                ordinal,
                duration_secs: settings.photo_duration,
                content: SlideContent::Composite([
                    kept[a].clone(),
                    kept[b].clone(),
                    kept[c].clone(),
                ]),
            },
        };
        out.slides.push(slide);
    }

    tracing::info!(
        items = items.len(),
        slides = out.slides.len(),
        "sequenced slides"
    );
    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/unit/sequence/slide.rs"]
mod tests;
