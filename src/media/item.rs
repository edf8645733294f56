use std::path::{Path, PathBuf};

use crate::foundation::error::{ReelError, ReelResult};

const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov"];

/// Media classification derived from the file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Still image.
    Photo,
    /// Video clip.
    Video,
}

impl MediaKind {
    /// Classify `path` by extension (case-insensitive). `None` for anything unrecognized.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Photo)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }
}

/// One discovered photo or video.
///
/// Items are snapshots: size and modification time are captured at discovery and are what the
/// cache fingerprints, so a rescan is needed to notice edits.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MediaItem {
    /// Absolute or caller-relative path.
    pub path: PathBuf,
    /// Photo or video.
    pub kind: MediaKind,
    /// Size in bytes at discovery time.
    pub size_bytes: u64,
    /// Modification time in nanoseconds since the Unix epoch, when the filesystem reports one.
    pub modified_unix_ns: Option<u64>,
}

impl MediaItem {
    /// Stat `path` and classify it.
    pub fn from_path(path: impl Into<PathBuf>) -> ReelResult<Self> {
        let path = path.into();
        let kind =
            MediaKind::from_path(&path).ok_or_else(|| ReelError::UnsupportedFormat(path.clone()))?;
        let meta = std::fs::metadata(&path).map_err(|_| ReelError::MissingSource(path.clone()))?;
        if !meta.is_file() {
            return Err(ReelError::MissingSource(path));
        }
        let modified_unix_ns = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .and_then(|d| u64::try_from(d.as_nanos()).ok());
        Ok(Self {
            path,
            kind,
            size_bytes: meta.len(),
            modified_unix_ns,
        })
    }

    /// File name component, lossily converted.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Fail with [`ReelError::MissingSource`] when the file disappeared since discovery.
    pub fn ensure_present(&self) -> ReelResult<()> {
        if self.path.is_file() {
            Ok(())
        } else {
            Err(ReelError::MissingSource(self.path.clone()))
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/item.rs"]
mod tests;
