use super::*;

#[test]
fn fps_rejects_zero_parts() {
    assert!(Fps::new(0, 1).is_err());
    assert!(Fps::new(25, 0).is_err());
    let fps = Fps::new(30000, 1001).unwrap();
    assert_eq!(fps.ffmpeg_arg(), "30000/1001");
}

#[test]
fn fps_rounds_seconds_to_frames() {
    let fps = Fps::new(25, 1).unwrap();
    assert_eq!(fps.secs_to_frames_round(1.0), 25);
    assert_eq!(fps.secs_to_frames_round(0.5), 13);
    assert_eq!(fps.secs_to_frames_round(-1.0), 0);
}

#[test]
fn canvas_requires_even_non_zero_sides() {
    assert!(Canvas::new(0, 10).is_err());
    assert!(Canvas::new(11, 10).is_err());
    assert!(Canvas::new(1920, 1080).is_ok());
}

#[test]
fn fit_letterboxes_wide_sources() {
    let canvas = Canvas::new(1920, 1080).unwrap();
    let p = canvas.fit(4000, 1000);
    assert_eq!((p.width, p.height), (1920, 480));
    assert_eq!((p.x, p.y), (0, 300));
}

#[test]
fn fit_pillarboxes_tall_sources() {
    let canvas = Canvas::new(1920, 1080).unwrap();
    let p = canvas.fit(1080, 1920);
    assert_eq!(p.height, 1080);
    assert_eq!(p.width, 608);
    assert_eq!(p.x, (1920 - 608) / 2);
    assert_eq!(p.y, 0);
}

#[test]
fn fit_of_empty_source_fills_canvas() {
    let canvas = Canvas::new(64, 32).unwrap();
    let p = canvas.fit(0, 0);
    assert_eq!((p.x, p.y, p.width, p.height), (0, 0, 64, 32));
}
