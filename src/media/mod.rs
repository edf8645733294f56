//! Media items and folder discovery.

/// Folder scanning.
pub mod discover;
/// [`item::MediaItem`] and [`item::MediaKind`].
pub mod item;
