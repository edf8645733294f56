#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{ImageFormat, Rgb, RgbImage};
use slidereel::{
    CancelToken, EncodeJob, EncodeRequest, EncoderError, EncoderGateway, ExportConfig, ExportEvent,
    MediaInfo,
};

/// Encoder double that writes small deterministic files and can cancel an export mid-run.
#[derive(Default)]
pub struct FakeEncoder {
    calls: Mutex<Vec<&'static str>>,
    encodes: AtomicUsize,
    cancel_after: Option<usize>,
    cancel: Mutex<Option<CancelToken>>,
}

impl FakeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the armed token once `n` encodes have completed. Encodes block until
    /// [`FakeEncoder::arm`] is called.
    pub fn cancelling_after(n: usize) -> Self {
        Self {
            cancel_after: Some(n),
            ..Self::default()
        }
    }

    pub fn arm(&self, token: CancelToken) {
        *self.cancel.lock().unwrap() = Some(token);
    }

    pub fn count(&self, label: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|l| **l == label)
            .count()
    }

    pub fn total(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn io(e: impl std::fmt::Display) -> EncoderError {
    EncoderError::Io(e.to_string())
}

impl EncoderGateway for FakeEncoder {
    fn encode(&self, request: &EncodeRequest<'_>, output: &Path) -> Result<(), EncoderError> {
        if self.cancel_after.is_some() {
            while self.cancel.lock().unwrap().is_none() {
                std::thread::yield_now();
            }
        }
        self.calls.lock().unwrap().push(request.job.label());
        let (w, h) = (request.canvas.width, request.canvas.height);
        let written = match &request.job {
            EncodeJob::ExtractFrame { .. } => RgbImage::from_pixel(w, h, Rgb([10, 20, 30]))
                .save_with_format(output, ImageFormat::Png)
                .map_err(io),
            EncodeJob::FrameSequence { frames } => {
                let mut buf = vec![0u8; (w * h * 3) as usize];
                for i in 0..frames.frame_count() {
                    frames.render_frame(i, &mut buf).map_err(io)?;
                }
                std::fs::write(output, format!("frames:{}", frames.frame_count())).map_err(io)
            }
            EncodeJob::StillClip {
                image,
                duration_secs,
            } => std::fs::write(output, format!("still:{}:{duration_secs}", name(image)))
                .map_err(io),
            EncodeJob::VideoClip {
                source,
                duration_secs,
            } => std::fs::write(output, format!("video:{}:{duration_secs}", name(source)))
                .map_err(io),
            EncodeJob::Concat { inputs, reencode } => {
                let mut body = format!("concat:{reencode}\n").into_bytes();
                for input in inputs {
                    body.extend(std::fs::read(input).map_err(io)?);
                    body.push(b'\n');
                }
                std::fs::write(output, body).map_err(io)
            }
            EncodeJob::Mux {
                video, soundtrack, ..
            } => {
                let mut body = std::fs::read(video).map_err(io)?;
                body.extend(format!("mux:{}", soundtrack.is_some()).into_bytes());
                std::fs::write(output, body).map_err(io)
            }
        };
        let done = self.encodes.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(n) = self.cancel_after
            && done >= n
            && let Some(token) = self.cancel.lock().unwrap().as_ref()
        {
            token.cancel();
        }
        written
    }

    fn probe(&self, path: &Path) -> Result<MediaInfo, EncoderError> {
        if !path.is_file() {
            return Err(io(format!("{}: not found", path.display())));
        }
        Ok(MediaInfo {
            duration_secs: 8.0,
            width: 640,
            height: 360,
            has_audio: true,
        })
    }
}

fn name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Solid-color 48x32 PNG photo.
pub fn write_photo(dir: &Path, file: &str, rgb: [u8; 3]) -> PathBuf {
    write_photo_sized(dir, file, rgb, (48, 32))
}

pub fn write_photo_sized(dir: &Path, file: &str, rgb: [u8; 3], (w, h): (u32, u32)) -> PathBuf {
    let path = dir.join(file);
    RgbImage::from_pixel(w, h, Rgb(rgb))
        .save_with_format(&path, ImageFormat::Png)
        .unwrap();
    path
}

/// Small config rooted at `root` with media in `root/media`.
pub fn config(root: &Path) -> ExportConfig {
    let media = root.join("media");
    std::fs::create_dir_all(&media).unwrap();
    ExportConfig {
        project_name: "reel".to_owned(),
        input_folder: media,
        output_folder: root.join("out"),
        fps: 10,
        resolution: [64, 36],
        video_quality: "draft".to_owned(),
        transition_duration: 0.5,
        ..ExportConfig::default()
    }
}

pub fn progress_fractions(events: &[ExportEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|e| match e {
            ExportEvent::Progress(p) => Some(p.fraction),
            _ => None,
        })
        .collect()
}

pub fn warnings(events: &[ExportEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ExportEvent::Warning(w) => Some(w.clone()),
            _ => None,
        })
        .collect()
}
