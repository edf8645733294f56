use std::path::Path;

use anyhow::Context as _;

use crate::foundation::error::{ReelError, ReelResult};
use crate::media::item::MediaItem;

/// Scan `folder` (non-recursive) for photos and videos, sorted by file name.
///
/// Hidden files are skipped. Any other regular file that is not a recognized photo or video is
/// rejected with [`ReelError::UnsupportedFormat`].
#[tracing::instrument(skip_all, fields(folder = %folder.display()))]
pub fn discover_media(folder: &Path) -> ReelResult<Vec<MediaItem>> {
    if !folder.is_dir() {
        return Err(ReelError::MissingSource(folder.to_path_buf()));
    }

    let mut paths = Vec::new();
    let entries = std::fs::read_dir(folder)
        .with_context(|| format!("failed to read media folder '{}'", folder.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list '{}'", folder.display()))?;
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if hidden || !path.is_file() {
            continue;
        }
        paths.push(path);
    }
    paths.sort_by_key(|p| p.file_name().map(|n| n.to_ascii_lowercase()));

    let items = paths
        .into_iter()
        .map(MediaItem::from_path)
        .collect::<ReelResult<Vec<_>>>()?;
    tracing::debug!(count = items.len(), "discovered media");
    Ok(items)
}

#[cfg(test)]
#[path = "../../tests/unit/media/discover.rs"]
mod tests;
