use std::f64::consts::FRAC_PI_2;

use crate::effects::transitions::{FoldDir, mul_div255};
use crate::foundation::error::{ReelError, ReelResult};

/// How much the far edge of the flap shrinks across the fold axis at 90 degrees.
const PERSPECTIVE: f64 = 0.18;
const AMBIENT: f64 = 0.4;
const DIFFUSE: f64 = 0.8;
/// Direction toward the light (top-left-front), normalized at use.
const TO_LIGHT: [f64; 3] = [0.3, 0.5, 0.8];

/// Inputs for one fold frame.
#[derive(Clone, Copy, Debug)]
pub struct FoldParams {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Eased progress in `[0, 1]`.
    pub progress: f64,
    /// Side that folds first.
    pub dir: FoldDir,
    /// Shade the flap.
    pub lighting: bool,
}

/// Render one frame of the two-phase fold into `dst`.
///
/// Phase one (`progress < 0.5`): the leading half of `from` rotates about the center hinge from
/// flat to edge-on, uncovering `to` beneath it. Phase two: the trailing half of `to` unfolds from
/// edge-on to flat over what is left of `from`. The rotating flap is projected with a simple
/// perspective taper and, when enabled, shaded by its angle to a fixed light.
///
/// Sampling is nearest-neighbor on integer pixel centers, so output is a pure function of the
/// inputs.
pub fn fold_rgb_in_place(
    dst: &mut [u8],
    from: &[u8],
    to: &[u8],
    params: FoldParams,
) -> ReelResult<()> {
    let FoldParams {
        width,
        height,
        progress,
        dir,
        lighting,
    } = params;
    let expected_len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| ReelError::validation("fold buffer size overflow"))?;
    if dst.len() != expected_len || from.len() != expected_len || to.len() != expected_len {
        return Err(ReelError::validation(
            "fold_rgb_in_place expects buffers matching width*height*3",
        ));
    }

    let horizontal = dir.is_horizontal();
    let (along_len, across_len) = if horizontal {
        (width, height)
    } else {
        (height, width)
    };
    let half = f64::from(along_len) / 2.0;
    let across_mid = f64::from(across_len) / 2.0;
    // Leading side is where along-axis coordinates are below the hinge.
    let leading_low = matches!(dir, FoldDir::Left | FoldDir::Up);

    let first_phase = progress < 0.5;
    let theta = if first_phase {
        progress * 2.0 * FRAC_PI_2
    } else {
        (1.0 - (progress - 0.5) * 2.0) * FRAC_PI_2
    };
    let extent = half * theta.cos();
    let sin_t = theta.sin();
    let shade = if lighting {
        flap_shade(theta, horizontal)
    } else {
        1.0
    };
    let shade_q = (shade * 255.0).round().clamp(0.0, 255.0) as u16;
    // The folding half and the static half always show the same image.
    let (flap_src, background) = if first_phase { (from, to) } else { (to, from) };

    for y in 0..height {
        for x in 0..width {
            let (along, across) = if horizontal { (x, y) } else { (y, x) };
            let pos = f64::from(along) + 0.5 - half;
            // Positive `d`: on the leading side of the hinge.
            let d = if leading_low { -pos } else { pos };
            let on_flap_side = if first_phase { d > 0.0 } else { d < 0.0 };

            let idx = ((y as usize) * (width as usize) + (x as usize)) * 3;

            let mut sampled = None;
            let dist = d.abs();
            if on_flap_side && extent > 0.0 && dist <= extent {
                let u = dist / extent;
                let taper = 1.0 - PERSPECTIVE * sin_t * u;
                let across_off = f64::from(across) + 0.5 - across_mid;
                let src_across = across_mid + across_off / taper;
                if (0.0..f64::from(across_len)).contains(&src_across) {
                    let src_dist = u * half;
                    let signed = if (d > 0.0) == leading_low {
                        -src_dist
                    } else {
                        src_dist
                    };
                    let src_along = (half + signed).floor().clamp(0.0, f64::from(along_len) - 1.0);
                    let src_along = src_along as u32;
                    let src_across = src_across.floor() as u32;
                    let (sx, sy) = if horizontal {
                        (src_along, src_across)
                    } else {
                        (src_across, src_along)
                    };
                    sampled = Some(((sy as usize) * (width as usize) + (sx as usize)) * 3);
                }
            }

            match sampled {
                Some(s) => {
                    for c in 0..3 {
                        dst[idx + c] = mul_div255(u16::from(flap_src[s + c]), shade_q) as u8;
                    }
                }
                None => {
                    let src = if on_flap_side { background } else { flap_src };
                    dst[idx..idx + 3].copy_from_slice(&src[idx..idx + 3]);
                }
            }
        }
    }

    Ok(())
}

/// Lambert shading of a flap tilted `theta` from the screen plane.
fn flap_shade(theta: f64, horizontal: bool) -> f64 {
    let len = (TO_LIGHT[0].powi(2) + TO_LIGHT[1].powi(2) + TO_LIGHT[2].powi(2)).sqrt();
    let tilt = if horizontal { TO_LIGHT[0] } else { TO_LIGHT[1] };
    let dot = (tilt * theta.sin() + TO_LIGHT[2] * theta.cos()) / len;
    (AMBIENT + DIFFUSE * dot.max(0.0)).clamp(0.0, 1.0)
}

#[cfg(test)]
#[path = "../../tests/unit/effects/fold.rs"]
mod tests;
