use sha2::{Digest as _, Sha256};

use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{ReelError, ReelResult};

/// Named H.264 encoder preset.
///
/// Every clip rendered for one export uses a single profile so segments can be concatenated with
/// stream copy. [`EncodingProfile::id`] covers every field, so editing a preset changes the
/// identity used in cache keys and old clips stop matching.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EncodingProfile {
    /// Preset name (`draft`, `standard`, `high`, `maximum`).
    pub name: String,
    /// x264 constant rate factor.
    pub crf: u8,
    /// x264 speed preset.
    pub speed_preset: String,
    /// H.264 feature profile.
    pub h264_profile: String,
    /// Largest canvas this profile renders at.
    pub max_canvas: Canvas,
    /// Highest frame rate this profile renders at.
    pub max_fps: u32,
    /// AAC bitrate for the muxed soundtrack.
    pub audio_bitrate_kbps: u32,
}

impl EncodingProfile {
    /// Names accepted by [`EncodingProfile::preset`].
    pub const PRESETS: [&'static str; 4] = ["draft", "standard", "high", "maximum"];

    /// Look up a built-in preset by name.
    pub fn preset(name: &str) -> ReelResult<Self> {
        let uhd = Canvas {
            width: 3840,
            height: 2160,
        };
        let (crf, speed, profile, max_canvas, max_fps, audio) = match name {
            "draft" => (
                28,
                "ultrafast",
                "main",
                Canvas {
                    width: 1280,
                    height: 720,
                },
                30,
                128,
            ),
            "standard" => (23, "fast", "high", uhd, 60, 192),
            "high" => (18, "medium", "high", uhd, 60, 256),
            "maximum" => (14, "slow", "high", uhd, 60, 320),
            other => {
                return Err(ReelError::validation(format!(
                    "unknown video_quality '{other}' (expected one of {})",
                    Self::PRESETS.join(", ")
                )));
            }
        };
        Ok(Self {
            name: name.to_owned(),
            crf,
            speed_preset: speed.to_owned(),
            h264_profile: profile.to_owned(),
            max_canvas,
            max_fps,
            audio_bitrate_kbps: audio,
        })
    }

    /// Versioned identity: the preset name plus a digest of every field.
    pub fn id(&self) -> String {
        let mut h = Sha256::new();
        h.update(self.name.as_bytes());
        h.update([0, self.crf]);
        h.update(self.speed_preset.as_bytes());
        h.update([0]);
        h.update(self.h264_profile.as_bytes());
        h.update([0]);
        h.update(self.max_canvas.width.to_le_bytes());
        h.update(self.max_canvas.height.to_le_bytes());
        h.update(self.max_fps.to_le_bytes());
        h.update(self.audio_bitrate_kbps.to_le_bytes());
        let digest = h.finalize();
        let short: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
        format!("{}-{short}", self.name)
    }

    /// Shrink `canvas` to fit the profile ceiling, keeping aspect ratio and even sides.
    pub fn clamp_canvas(&self, canvas: Canvas) -> Canvas {
        if canvas.width <= self.max_canvas.width && canvas.height <= self.max_canvas.height {
            return canvas;
        }
        let fit = self.max_canvas.fit(canvas.width, canvas.height);
        Canvas {
            width: (fit.width & !1).max(2),
            height: (fit.height & !1).max(2),
        }
    }

    /// Cap `fps` at the profile ceiling.
    pub fn clamp_fps(&self, fps: Fps) -> Fps {
        if fps.as_f64() <= f64::from(self.max_fps) {
            fps
        } else {
            Fps {
                num: self.max_fps,
                den: 1,
            }
        }
    }

    /// ffmpeg output arguments for H.264 video in this profile.
    pub fn video_args(&self) -> Vec<String> {
        [
            "-c:v",
            "libx264",
            "-preset",
            &self.speed_preset,
            "-profile:v",
            &self.h264_profile,
            "-crf",
            &self.crf.to_string(),
            "-pix_fmt",
            "yuv420p",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/profile.rs"]
mod tests;
