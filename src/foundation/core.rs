use crate::foundation::error::{ReelError, ReelResult};

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> ReelResult<Self> {
        if den == 0 {
            return Err(ReelError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(ReelError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Number of frames covering `secs`, rounded to the nearest frame.
    pub fn secs_to_frames_round(self, secs: f64) -> u64 {
        (secs * self.as_f64()).round().max(0.0) as u64
    }

    /// The `num/den` form ffmpeg accepts for `-r` and the `fps` filter.
    pub fn ffmpeg_arg(self) -> String {
        format!("{}/{}", self.num, self.den)
    }
}

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Placement of a scaled source inside a canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    /// Left offset in pixels.
    pub x: u32,
    /// Top offset in pixels.
    pub y: u32,
    /// Scaled width in pixels.
    pub width: u32,
    /// Scaled height in pixels.
    pub height: u32,
}

impl Canvas {
    /// Create a validated canvas. Both sides must be non-zero and even (yuv420p).
    pub fn new(width: u32, height: u32) -> ReelResult<Self> {
        if width == 0 || height == 0 {
            return Err(ReelError::validation("canvas width/height must be non-zero"));
        }
        if !width.is_multiple_of(2) || !height.is_multiple_of(2) {
            return Err(ReelError::validation(
                "canvas width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        Ok(Self { width, height })
    }

    /// Scale `src_w x src_h` to fit inside the canvas preserving aspect ratio, centered.
    ///
    /// The remainder is letterbox (top/bottom) or pillarbox (left/right) padding.
    pub fn fit(self, src_w: u32, src_h: u32) -> Placement {
        if src_w == 0 || src_h == 0 {
            return Placement {
                x: 0,
                y: 0,
                width: self.width,
                height: self.height,
            };
        }
        let scale = f64::min(
            f64::from(self.width) / f64::from(src_w),
            f64::from(self.height) / f64::from(src_h),
        );
        let width = ((f64::from(src_w) * scale).round() as u32).clamp(1, self.width);
        let height = ((f64::from(src_h) * scale).round() as u32).clamp(1, self.height);
        Placement {
            x: (self.width - width) / 2,
            y: (self.height - height) / 2,
            width,
            height,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
