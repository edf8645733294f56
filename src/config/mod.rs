//! JSON export configuration.
//!
//! Every key is optional; missing keys take the defaults below and unknown keys are ignored so
//! config files written by other front-ends still load.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;

use crate::animation::ease::Ease;
use crate::effects::transitions::{FoldDir, TransitionKind, TransitionSpec};
use crate::encode::profile::EncodingProfile;
use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{ReelError, ReelResult};
use crate::pipeline::orchestrator::RenderThreading;
use crate::sequence::slide::SequenceSettings;

/// Directory name used for the cache when `cache_dir` is not set.
pub const DEFAULT_CACHE_DIR_NAME: &str = ".slidereel-cache";

/// Export settings.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Output file stem.
    pub project_name: String,
    /// Folder scanned for media.
    pub input_folder: PathBuf,
    /// Folder the finished video is written to.
    pub output_folder: PathBuf,
    /// Seconds per photo or composite slide.
    pub photo_duration: f64,
    /// `0` skips videos, `-1` keeps them whole, otherwise the cap in seconds.
    pub video_duration: f64,
    /// Seconds per transition.
    pub transition_duration: f64,
    /// Transition effect.
    pub transition_type: TransitionKind,
    /// Transition easing.
    pub transition_easing: Ease,
    /// Fold direction.
    pub transition_direction: FoldDir,
    /// Shade folding flaps.
    pub transition_lighting: bool,
    /// Output frame rate.
    pub fps: u32,
    /// Output `[width, height]`.
    pub resolution: [u32; 2],
    /// Encoding preset name.
    pub video_quality: String,
    /// Composite slide after this many single photos, `0` disables composites.
    pub multi_slide_frequency: i32,
    /// Cache root, defaults to `<output_folder>/.slidereel-cache`.
    pub cache_dir: Option<PathBuf>,
    /// Optional audio track.
    pub soundtrack_path: Option<PathBuf>,
    /// Upper bound for any single encoder run.
    pub encoder_timeout_secs: u64,
    /// Unit-level render parallelism.
    pub render_threading: RenderThreading,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            project_name: "MyProject".to_owned(),
            input_folder: PathBuf::from("media/input"),
            output_folder: PathBuf::from("media/output"),
            photo_duration: 3.0,
            video_duration: 5.0,
            transition_duration: 1.0,
            transition_type: TransitionKind::Fade,
            transition_easing: Ease::InOutQuad,
            transition_direction: FoldDir::Left,
            transition_lighting: true,
            fps: 25,
            resolution: [1920, 1080],
            video_quality: "standard".to_owned(),
            multi_slide_frequency: 0,
            cache_dir: None,
            soundtrack_path: None,
            encoder_timeout_secs: 600,
            render_threading: RenderThreading::default(),
        }
    }
}

impl ExportConfig {
    /// Parse a config from JSON, merging it over the defaults.
    pub fn from_reader<R: Read>(reader: R) -> ReelResult<Self> {
        serde_json::from_reader(reader)
            .map_err(|e| ReelError::validation(format!("invalid config: {e}")))
    }

    /// Read a config file.
    pub fn from_path(path: &Path) -> ReelResult<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open config '{}'", path.display()))?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Read `path` if it exists.
    ///
    /// A missing file gives the defaults. An unreadable or malformed one gives the defaults plus
    /// a warning describing the problem.
    pub fn load_or_default(path: &Path) -> (Self, Option<String>) {
        if !path.exists() {
            return (Self::default(), None);
        }
        match Self::from_path(path) {
            Ok(cfg) => (cfg, None),
            Err(e) => {
                let warning = format!(
                    "failed to load config '{}' ({e}), using defaults",
                    path.display()
                );
                tracing::warn!("{warning}");
                (Self::default(), Some(warning))
            }
        }
    }

    /// Check every value that can be checked without touching the filesystem.
    pub fn validate(&self) -> ReelResult<()> {
        if self.project_name.trim().is_empty() {
            return Err(ReelError::validation("project_name must not be empty"));
        }
        if self.project_name.contains(['/', '\\']) {
            return Err(ReelError::validation(
                "project_name must not contain path separators",
            ));
        }
        if !self.photo_duration.is_finite() || self.photo_duration <= 0.0 {
            return Err(ReelError::validation("photo_duration must be > 0"));
        }
        if !self.video_duration.is_finite()
            || (self.video_duration < 0.0 && self.video_duration != -1.0)
        {
            return Err(ReelError::validation(
                "video_duration must be 0 (skip), -1 (full length) or > 0",
            ));
        }
        if self.encoder_timeout_secs == 0 {
            return Err(ReelError::validation("encoder_timeout_secs must be >= 1"));
        }
        if let Some(n) = self.render_threading.threads
            && n == 0
        {
            return Err(ReelError::validation(
                "render threading 'threads' must be >= 1 when set",
            ));
        }
        self.transition_spec().validate()?;
        self.canvas()?;
        self.fps()?;
        self.profile()?;
        Ok(())
    }

    /// Requested canvas, before the profile ceiling is applied.
    pub fn canvas(&self) -> ReelResult<Canvas> {
        Canvas::new(self.resolution[0], self.resolution[1])
    }

    /// Requested frame rate, before the profile ceiling is applied.
    pub fn fps(&self) -> ReelResult<Fps> {
        Fps::new(self.fps, 1)
    }

    /// Encoding preset named by `video_quality`.
    pub fn profile(&self) -> ReelResult<EncodingProfile> {
        EncodingProfile::preset(&self.video_quality)
    }

    /// Transition parameters.
    pub fn transition_spec(&self) -> TransitionSpec {
        TransitionSpec {
            kind: self.transition_type,
            ease: self.transition_easing,
            direction: self.transition_direction,
            duration_secs: self.transition_duration,
            lighting: self.transition_lighting,
        }
    }

    /// Sequencer duration rules.
    pub fn sequence_settings(&self) -> SequenceSettings {
        SequenceSettings {
            photo_duration: self.photo_duration,
            video_duration: self.video_duration,
            multi_slide_frequency: self.multi_slide_frequency,
        }
    }

    /// Cache root.
    pub fn cache_root(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.output_folder.join(DEFAULT_CACHE_DIR_NAME))
    }

    /// `<output_folder>/<project_name>.mp4`.
    pub fn output_path(&self) -> PathBuf {
        self.output_folder.join(format!("{}.mp4", self.project_name))
    }

    /// Encoder timeout.
    pub fn encoder_timeout(&self) -> Duration {
        Duration::from_secs(self.encoder_timeout_secs)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/config/config.rs"]
mod tests;
