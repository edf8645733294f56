use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};

use crate::foundation::core::Canvas;
use crate::foundation::error::{ReelError, ReelResult};

/// Share of the canvas width given to the main photo of a composite slide.
pub const MAIN_WIDTH_SHARE: f64 = 0.7;

const FILTER: FilterType = FilterType::Lanczos3;

/// Build the still for a composite slide.
///
/// The main photo fills the left 70% preserving its aspect ratio on black. The two previews
/// share the right 30%, top and bottom, each scaled to cover its cell and center-cropped.
pub fn compose_multi_slide(
    main: &DynamicImage,
    previews: [&DynamicImage; 2],
    canvas: Canvas,
) -> ReelResult<RgbImage> {
    let main_w = (f64::from(canvas.width) * MAIN_WIDTH_SHARE) as u32;
    let preview_w = canvas.width.saturating_sub(main_w);
    let top_h = canvas.height / 2;
    let bottom_h = canvas.height - top_h;
    if main_w == 0 || preview_w == 0 || top_h == 0 {
        return Err(ReelError::validation(format!(
            "canvas {}x{} is too small for a composite slide",
            canvas.width, canvas.height
        )));
    }

    let mut out = RgbImage::from_pixel(canvas.width, canvas.height, Rgb([0, 0, 0]));

    let main_cell = fit_to_cell(main, main_w, canvas.height);
    imageops::replace(&mut out, &main_cell, 0, 0);

    let top = cover_cell(previews[0], preview_w, top_h);
    imageops::replace(&mut out, &top, i64::from(main_w), 0);
    let bottom = cover_cell(previews[1], preview_w, bottom_h);
    imageops::replace(&mut out, &bottom, i64::from(main_w), i64::from(top_h));

    Ok(out)
}

/// Letterbox `img` into a `w x h` black cell.
pub fn fit_to_cell(img: &DynamicImage, w: u32, h: u32) -> RgbImage {
    let cell = Canvas {
        width: w,
        height: h,
    };
    let place = cell.fit(img.width(), img.height());
    let scaled = imageops::resize(&img.to_rgb8(), place.width, place.height, FILTER);
    let mut out = RgbImage::from_pixel(w, h, Rgb([0, 0, 0]));
    imageops::replace(&mut out, &scaled, i64::from(place.x), i64::from(place.y));
    out
}

/// Scale `img` to cover a `w x h` cell and crop the overflow evenly from both sides.
pub fn cover_cell(img: &DynamicImage, w: u32, h: u32) -> RgbImage {
    let (iw, ih) = (img.width().max(1), img.height().max(1));
    let scale = f64::max(f64::from(w) / f64::from(iw), f64::from(h) / f64::from(ih));
    let sw = ((f64::from(iw) * scale).round() as u32).max(w);
    let sh = ((f64::from(ih) * scale).round() as u32).max(h);
    let scaled = imageops::resize(&img.to_rgb8(), sw, sh, FILTER);
    imageops::crop_imm(&scaled, (sw - w) / 2, (sh - h) / 2, w, h).to_image()
}

#[cfg(test)]
#[path = "../../tests/unit/effects/layout.rs"]
mod tests;
