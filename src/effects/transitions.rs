use crate::animation::ease::Ease;
use crate::cache::fingerprint::OpParams;
use crate::effects::fold::{FoldParams, fold_rgb_in_place};
use crate::foundation::core::Fps;
use crate::foundation::error::{ReelError, ReelResult};

/// Transition effect family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Plain cross-fade.
    #[default]
    Fade,
    /// Paper fold around the center hinge.
    #[serde(alias = "origami")]
    Fold,
}

impl TransitionKind {
    /// Stable identifier.
    pub fn id(self) -> &'static str {
        match self {
            Self::Fade => "fade",
            Self::Fold => "fold",
        }
    }
}

/// Side whose half folds away first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldDir {
    /// Left half folds over toward the right.
    #[default]
    Left,
    /// Right half folds over toward the left.
    Right,
    /// Top half folds down.
    Up,
    /// Bottom half folds up.
    Down,
}

impl FoldDir {
    /// Stable identifier.
    pub fn id(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    /// `true` when the hinge is vertical (the fold travels along x).
    pub fn is_horizontal(self) -> bool {
        matches!(self, Self::Left | Self::Right)
    }
}

/// Transition parameters, constant for a whole export.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TransitionSpec {
    /// Effect family.
    pub kind: TransitionKind,
    /// Progress easing.
    pub ease: Ease,
    /// Fold direction (ignored by fades).
    pub direction: FoldDir,
    /// Length in seconds.
    pub duration_secs: f64,
    /// Shade the folding flap by its angle to a fixed light.
    pub lighting: bool,
}

impl Default for TransitionSpec {
    fn default() -> Self {
        Self {
            kind: TransitionKind::Fade,
            ease: Ease::InOutQuad,
            direction: FoldDir::Left,
            duration_secs: 1.0,
            lighting: true,
        }
    }
}

impl TransitionSpec {
    /// Reject non-positive or non-finite durations.
    pub fn validate(&self) -> ReelResult<()> {
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(ReelError::validation("transition_duration must be > 0"));
        }
        Ok(())
    }

    /// Frames rendered for this transition at `fps`, at least two.
    pub fn frame_count(&self, fps: Fps) -> u32 {
        fps.secs_to_frames_round(self.duration_secs).clamp(2, u64::from(u32::MAX)) as u32
    }

    /// Parameters that identify the rendered output, for cache keys.
    ///
    /// Fades ignore direction and lighting, so those are left out for them.
    pub fn op_params(&self) -> OpParams {
        let params = OpParams::new()
            .with("transition", self.kind.id())
            .with("ease", self.ease.id())
            .with("duration", self.duration_secs);
        match self.kind {
            TransitionKind::Fade => params,
            TransitionKind::Fold => params
                .with("direction", self.direction.id())
                .with("lighting", self.lighting),
        }
    }

    /// Render frame `index` of `count` into `dst` (RGB24, `width * height * 3`).
    ///
    /// Normalized time is `index / (count - 1)`, so the first frame is exactly `from` and the
    /// last exactly `to`.
    pub fn render_frame(
        &self,
        dst: &mut [u8],
        from: &[u8],
        to: &[u8],
        size: (u32, u32),
        index: u32,
        count: u32,
    ) -> ReelResult<()> {
        let t = if count <= 1 {
            1.0
        } else {
            f64::from(index) / f64::from(count - 1)
        };
        let p = self.ease.apply(t);
        match self.kind {
            TransitionKind::Fade => crossfade_rgb_in_place(dst, from, to, p),
            TransitionKind::Fold => fold_rgb_in_place(
                dst,
                from,
                to,
                FoldParams {
                    width: size.0,
                    height: size.1,
                    progress: p.clamp(0.0, 1.0),
                    dir: self.direction,
                    lighting: self.lighting,
                },
            ),
        }
    }
}

/// Blend `a` toward `b` by `t` into `dst`. All buffers are RGB24 of equal length.
pub fn crossfade_rgb_in_place(dst: &mut [u8], a: &[u8], b: &[u8], t: f64) -> ReelResult<()> {
    if dst.len() != a.len() || dst.len() != b.len() || !dst.len().is_multiple_of(3) {
        return Err(ReelError::validation(
            "crossfade_rgb_in_place expects equal-length rgb8 buffers",
        ));
    }
    let tt = ((t.clamp(0.0, 1.0) * 255.0).round() as u16).min(255);
    let it = 255 - tt;
    for ((d, a), b) in dst.iter_mut().zip(a).zip(b) {
        *d = (mul_div255(u16::from(*a), it) + mul_div255(u16::from(*b), tt)).min(255) as u8;
    }
    Ok(())
}

pub(crate) fn mul_div255(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

#[cfg(test)]
#[path = "../../tests/unit/effects/transitions.rs"]
mod tests;
