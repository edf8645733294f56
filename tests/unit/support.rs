//! In-process encoder used by unit tests.

use std::path::Path;
use std::sync::Mutex;

use image::{ImageFormat, Rgb, RgbImage};

use crate::encode::gateway::{EncodeJob, EncodeRequest, EncoderError, EncoderGateway, MediaInfo};

/// Writes small deterministic files instead of running ffmpeg and records every job label.
pub(crate) struct FakeEncoder {
    pub(crate) calls: Mutex<Vec<&'static str>>,
    pub(crate) video_secs: f64,
    pub(crate) fail_on: Option<&'static str>,
}

impl FakeEncoder {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            video_secs: 8.0,
            fail_on: None,
        }
    }

    pub(crate) fn failing_on(label: &'static str) -> Self {
        Self {
            fail_on: Some(label),
            ..Self::new()
        }
    }

    pub(crate) fn count(&self, label: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|l| **l == label).count()
    }

    pub(crate) fn total(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn io(e: impl std::fmt::Display) -> EncoderError {
    EncoderError::Io(e.to_string())
}

impl EncoderGateway for FakeEncoder {
    fn encode(&self, request: &EncodeRequest<'_>, output: &Path) -> Result<(), EncoderError> {
        let label = request.job.label();
        self.calls.lock().unwrap().push(label);
        if self.fail_on == Some(label) {
            return Err(EncoderError::Failed {
                exit_code: Some(1),
                stderr: format!("fake {label} failure"),
            });
        }
        let (w, h) = (request.canvas.width, request.canvas.height);
        match &request.job {
            EncodeJob::ExtractFrame { .. } => RgbImage::from_pixel(w, h, Rgb([90, 60, 30]))
                .save_with_format(output, ImageFormat::Png)
                .map_err(io),
            EncodeJob::FrameSequence { frames } => {
                let mut buf = vec![0u8; (w * h * 3) as usize];
                let mut checksum = 0u64;
                for i in 0..frames.frame_count() {
                    frames.render_frame(i, &mut buf).map_err(io)?;
                    checksum = buf
                        .iter()
                        .fold(checksum, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(*b)));
                }
                std::fs::write(output, format!("frames:{}:{checksum}", frames.frame_count()))
                    .map_err(io)
            }
            EncodeJob::StillClip {
                image,
                duration_secs,
            } => std::fs::write(output, format!("still:{}:{duration_secs}", image.display()))
                .map_err(io),
            EncodeJob::VideoClip {
                source,
                duration_secs,
            } => std::fs::write(output, format!("video:{}:{duration_secs}", source.display()))
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
                body.extend(format!("\nmux:{}", soundtrack.is_some()).into_bytes());
                std::fs::write(output, body).map_err(io)
            }
        }
    }

    fn probe(&self, path: &Path) -> Result<MediaInfo, EncoderError> {
        if !path.is_file() {
            return Err(EncoderError::Failed {
                exit_code: Some(1),
                stderr: format!("{}: No such file or directory", path.display()),
            });
        }
        Ok(MediaInfo {
            duration_secs: self.video_secs,
            width: 640,
            height: 360,
            has_audio: true,
        })
    }
}
