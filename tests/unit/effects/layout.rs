use super::*;

fn solid(w: u32, h: u32, rgb: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(rgb)))
}

#[test]
fn composite_places_main_left_and_previews_right() {
    let canvas = Canvas::new(200, 100).unwrap();
    let main = solid(140, 100, [255, 0, 0]);
    let top = solid(30, 30, [0, 255, 0]);
    let bottom = solid(30, 30, [0, 0, 255]);
    let out = compose_multi_slide(&main, [&top, &bottom], canvas).unwrap();

    assert_eq!(out.dimensions(), (200, 100));
    assert_eq!(out.get_pixel(70, 50).0, [255, 0, 0]);
    assert_eq!(out.get_pixel(170, 25).0, [0, 255, 0]);
    assert_eq!(out.get_pixel(170, 75).0, [0, 0, 255]);
}

#[test]
fn main_photo_is_letterboxed_not_cropped() {
    let canvas = Canvas::new(200, 100).unwrap();
    // Very wide main photo: bands above and below stay black.
    let main = solid(1400, 100, [255, 255, 255]);
    let p = solid(10, 10, [0, 0, 0]);
    let out = compose_multi_slide(&main, [&p, &p], canvas).unwrap();
    assert_eq!(out.get_pixel(70, 2).0, [0, 0, 0]);
    assert_eq!(out.get_pixel(70, 50).0, [255, 255, 255]);
}

#[test]
fn cover_cell_fills_completely() {
    let img = solid(10, 40, [9, 9, 9]);
    let cell = cover_cell(&img, 60, 20);
    assert_eq!(cell.dimensions(), (60, 20));
    assert!(cell.pixels().all(|p| p.0 == [9, 9, 9]));
}

#[test]
fn fit_to_cell_keeps_requested_size() {
    let img = solid(10, 40, [9, 9, 9]);
    let cell = fit_to_cell(&img, 60, 20);
    assert_eq!(cell.dimensions(), (60, 20));
    assert_eq!(cell.get_pixel(0, 10).0, [0, 0, 0]);
    assert_eq!(cell.get_pixel(30, 10).0, [9, 9, 9]);
}

#[test]
fn tiny_canvas_is_rejected() {
    let canvas = Canvas {
        width: 1,
        height: 2,
    };
    let p = solid(4, 4, [1, 2, 3]);
    assert!(compose_multi_slide(&p, [&p, &p], canvas).is_err());
}
