use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{ReelError, ReelResult};
use crate::foundation::fs::{TempFileGuard, unique_name};
use crate::sequence::slide::SlideKind;

/// Current metadata layout version.
pub const METADATA_VERSION: u32 = 1;

/// Whether a segment is a slide or a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SegmentKind {
    /// A slide clip.
    Slide {
        /// Single or composite.
        slide_kind: SlideKind,
    },
    /// A transition clip between two slides.
    Transition,
}

/// One segment of the assembled video.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SegmentRecord {
    /// Position in the timeline (0-based).
    pub index: usize,
    /// Slide or transition.
    #[serde(flatten)]
    pub kind: SegmentKind,
    /// Source file names.
    pub source: String,
    /// Cached clip the segment was cut from.
    pub clip: PathBuf,
    /// Length in seconds.
    pub duration_secs: f64,
    /// Start on the output timeline.
    pub start_secs: f64,
    /// End on the output timeline.
    pub end_secs: f64,
}

/// Sidecar written next to an exported video as `<video>.metadata.json`.
///
/// Lets later editing tools locate each slide and transition in the output.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OutputMetadata {
    /// Layout version.
    pub version: u32,
    /// Exported video.
    pub output: PathBuf,
    /// Export time.
    pub created_at: DateTime<Utc>,
    /// Encoding profile identity.
    pub profile_id: String,
    /// Output canvas.
    pub canvas: Canvas,
    /// Output frame rate.
    pub fps: Fps,
    /// Soundtrack that was mixed in, `None` for silent output.
    pub soundtrack: Option<PathBuf>,
    /// Total length in seconds.
    pub duration_secs: f64,
    /// Segments in timeline order.
    pub segments: Vec<SegmentRecord>,
}

impl OutputMetadata {
    /// Sidecar path for `video`.
    pub fn path_for(video: &Path) -> PathBuf {
        let mut name = video.file_name().unwrap_or_default().to_os_string();
        name.push(".metadata.json");
        video.with_file_name(name)
    }

    /// Read a sidecar.
    pub fn from_path(path: &Path) -> ReelResult<Self> {
        let bytes = std::fs::read(path).map_err(|_| ReelError::MissingSource(path.to_path_buf()))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ReelError::validation(format!("invalid metadata '{}': {e}", path.display()))
        })
    }

    /// Write the sidecar for `self.output`, replacing any previous one atomically.
    pub fn write(&self) -> ReelResult<PathBuf> {
        use anyhow::Context as _;

        let path = Self::path_for(&self.output);
        let tmp = path.with_file_name(unique_name(".metadata", "json"));
        let mut guard = TempFileGuard(Some(tmp.clone()));
        let json = serde_json::to_vec_pretty(self).context("failed to encode output metadata")?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("failed to write '{}'", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("failed to publish '{}'", path.display()))?;
        guard.disarm();
        Ok(path)
    }
}
