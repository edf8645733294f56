use std::ffi::OsStr;
use std::path::PathBuf;

use super::*;
use crate::encode::profile::EncodingProfile;
use crate::foundation::core::Fps;

fn args_of(cmd: &Command) -> Vec<String> {
    cmd.get_args()
        .map(OsStr::to_string_lossy)
        .map(|s| s.into_owned())
        .collect()
}

fn request<'a>(job: EncodeJob<'a>, profile: &'a EncodingProfile) -> EncodeRequest<'a> {
    EncodeRequest {
        job,
        canvas: Canvas::new(640, 360).unwrap(),
        fps: Fps::new(25, 1).unwrap(),
        profile,
    }
}

#[test]
fn still_clip_loops_image_and_letterboxes() {
    let profile = EncodingProfile::preset("draft").unwrap();
    let gw = FfmpegGateway::new(Duration::from_secs(5));
    let req = request(
        EncodeJob::StillClip {
            image: PathBuf::from("a.jpg"),
            duration_secs: 3.0,
        },
        &profile,
    );
    let args = args_of(&gw.build(&req, Path::new("out.mp4")).unwrap());
    let joined = args.join(" ");
    assert!(joined.contains("-loop 1 -framerate 25/1 -t 3.000 -i a.jpg"), "{joined}");
    assert!(joined.contains("scale=640:360:force_original_aspect_ratio=decrease"));
    assert!(joined.contains("pad=640:360:(ow-iw)/2:(oh-ih)/2:black"));
    assert!(joined.contains("-an"));
    assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
}

#[test]
fn last_frame_extraction_seeks_from_end() {
    let profile = EncodingProfile::preset("draft").unwrap();
    let gw = FfmpegGateway::new(Duration::from_secs(5));
    let req = request(
        EncodeJob::ExtractFrame {
            source: PathBuf::from("clip.mp4"),
            position: FramePosition::Last,
        },
        &profile,
    );
    let args = args_of(&gw.build(&req, Path::new("f.png")).unwrap());
    assert_eq!(&args[4..6], ["-sseof", "-0.1"]);
    assert!(!args.iter().any(|a| a == "-frames:v"));
}

#[test]
fn mux_without_soundtrack_uses_silent_source() {
    let profile = EncodingProfile::preset("standard").unwrap();
    let gw = FfmpegGateway::new(Duration::from_secs(5));
    let req = request(
        EncodeJob::Mux {
            video: PathBuf::from("v.mp4"),
            soundtrack: None,
            duration_secs: 10.0,
            fade_secs: 1.0,
        },
        &profile,
    );
    let joined = args_of(&gw.build(&req, Path::new("o.mp4")).unwrap()).join(" ");
    assert!(joined.contains(SILENT_AUDIO));
    assert!(joined.contains("-c:v copy -c:a aac -b:a 192k -t 10.000"), "{joined}");
    assert!(!joined.contains("afade"));
}

#[test]
fn mux_with_soundtrack_loops_and_fades() {
    let profile = EncodingProfile::preset("standard").unwrap();
    let gw = FfmpegGateway::new(Duration::from_secs(5));
    let req = request(
        EncodeJob::Mux {
            video: PathBuf::from("v.mp4"),
            soundtrack: Some(PathBuf::from("song.mp3")),
            duration_secs: 10.0,
            fade_secs: 1.0,
        },
        &profile,
    );
    let joined = args_of(&gw.build(&req, Path::new("o.mp4")).unwrap()).join(" ");
    assert!(joined.contains("-stream_loop -1 -i song.mp3"));
    assert!(joined.contains("afade=t=in:st=0:d=1.000,afade=t=out:st=9.000:d=1.000"));
}

#[test]
fn concat_writes_quoted_absolute_list() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("joined.mp4");
    let inputs = vec![dir.path().join("a.mp4"), dir.path().join("it's.mp4")];
    let profile = EncodingProfile::preset("standard").unwrap();
    let gw = FfmpegGateway::new(Duration::from_secs(5));
    let req = request(
        EncodeJob::Concat {
            inputs,
            reencode: false,
        },
        &profile,
    );
    let joined = args_of(&gw.build(&req, &out).unwrap()).join(" ");
    assert!(joined.contains("-f concat -safe 0"));
    assert!(joined.contains("-c copy"));

    let list = std::fs::read_to_string(concat_list_path(&out)).unwrap();
    let lines: Vec<&str> = list.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("file '/") || cfg!(windows));
    assert!(lines[1].ends_with("it'\\''s.mp4'"), "{}", lines[1]);
}

#[test]
fn missing_binary_is_a_spawn_error() {
    let gw = FfmpegGateway {
        ffmpeg: "slidereel-no-such-ffmpeg".to_owned(),
        ffprobe: "slidereel-no-such-ffprobe".to_owned(),
        timeout: Duration::from_secs(5),
    };
    let err = gw.probe(Path::new("x.mp4")).unwrap_err();
    assert!(matches!(err, EncoderError::Spawn { .. }), "{err:?}");
}

#[cfg(unix)]
struct Gray(u32);

#[cfg(unix)]
impl FrameSource for Gray {
    fn frame_count(&self) -> u32 {
        self.0
    }

    fn render_frame(&self, _index: u32, rgb: &mut [u8]) -> crate::ReelResult<()> {
        rgb.fill(128);
        Ok(())
    }
}

/// Gateway whose ffmpeg and ffprobe are both the shell script `body`.
#[cfg(unix)]
fn scripted(dir: &Path, body: &str) -> FfmpegGateway {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("tool.sh");
    std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    let program = script.to_string_lossy().into_owned();
    FfmpegGateway {
        ffmpeg: program.clone(),
        ffprobe: program,
        timeout: Duration::from_millis(300),
    }
}

#[cfg(unix)]
#[test]
fn stalled_media_inspection_is_killed_at_the_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let gw = scripted(dir.path(), "sleep 5");
    let started = Instant::now();
    let err = gw.probe(Path::new("x.mp4")).unwrap_err();
    assert!(matches!(err, EncoderError::Timeout { .. }), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
}

#[cfg(unix)]
#[test]
fn frame_sequence_times_out_when_ffmpeg_stops_reading() {
    let dir = tempfile::tempdir().unwrap();
    let gw = scripted(dir.path(), "sleep 5");
    let profile = EncodingProfile::preset("draft").unwrap();
    let frames = Gray(10);
    let req = EncodeRequest {
        job: EncodeJob::FrameSequence { frames: &frames },
        canvas: Canvas::new(1920, 1080).unwrap(),
        fps: Fps::new(25, 1).unwrap(),
        profile: &profile,
    };
    let started = Instant::now();
    let err = gw.encode(&req, &dir.path().join("out.mp4")).unwrap_err();
    assert!(matches!(err, EncoderError::Timeout { .. }), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
}

#[cfg(unix)]
#[test]
fn frame_sequence_streams_every_frame_then_closes_stdin() {
    let dir = tempfile::tempdir().unwrap();
    // Copy stdin to the last argument, the output path.
    let mut gw = scripted(dir.path(), "for last; do :; done\ncat > \"$last\"");
    gw.timeout = Duration::from_secs(10);
    let profile = EncodingProfile::preset("draft").unwrap();
    let frames = Gray(12);
    let req = EncodeRequest {
        job: EncodeJob::FrameSequence { frames: &frames },
        canvas: Canvas::new(64, 36).unwrap(),
        fps: Fps::new(25, 1).unwrap(),
        profile: &profile,
    };
    let out = dir.path().join("out.raw");
    gw.encode(&req, &out).unwrap();
    let bytes = std::fs::read(&out).unwrap();
    assert_eq!(bytes.len(), 12 * 64 * 36 * 3);
    assert!(bytes.iter().all(|&b| b == 128));
}
