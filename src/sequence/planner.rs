use crate::media::item::MediaKind;

/// Number of photos grouped into one composite slide.
pub const COMPOSITE_SIZE: usize = 3;

/// One step of a slide plan, referring to positions in the input list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlidePlan {
    /// A single photo or video.
    Single(usize),
    /// Three consecutive photos shown together.
    Composite([usize; COMPOSITE_SIZE]),
}

/// Decide which items become composite slides.
///
/// Walks `kinds` in order with a counter of single photo slides emitted since the last
/// composite. Videos are always singles and leave the counter alone. At a photo, if the counter
/// has reached `frequency` and this photo and the next two are all photos, the three become one
/// composite and the counter resets. Otherwise the photo is a single and the counter increments.
/// A `frequency <= 0` disables composites.
///
/// The plan covers every input index exactly once, in input order.
pub fn plan_slides(kinds: &[MediaKind], frequency: i32) -> Vec<SlidePlan> {
    let threshold = usize::try_from(frequency).ok().filter(|n| *n > 0);
    let mut plan = Vec::with_capacity(kinds.len());
    let mut since_composite = 0usize;
    let mut i = 0;

    while i < kinds.len() {
        match kinds[i] {
            MediaKind::Video => {
                plan.push(SlidePlan::Single(i));
                i += 1;
            }
            MediaKind::Photo => {
                let photo_run = kinds[i..]
                    .iter()
                    .take(COMPOSITE_SIZE)
                    .take_while(|k| **k == MediaKind::Photo)
                    .count();
                if let Some(n) = threshold
                    && since_composite >= n
                    && photo_run == COMPOSITE_SIZE
                {
                    plan.push(SlidePlan::Composite([i, i + 1, i + 2]));
                    since_composite = 0;
                    i += COMPOSITE_SIZE;
                } else {
                    plan.push(SlidePlan::Single(i));
                    since_composite += 1;
                    i += 1;
                }
            }
        }
    }

    plan
}

#[cfg(test)]
#[path = "../../tests/unit/sequence/planner.rs"]
mod tests;
