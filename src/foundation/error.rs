use std::fmt;
use std::path::PathBuf;

use crate::encode::gateway::EncoderError;

/// Convenience result type used across slidereel.
pub type ReelResult<T> = Result<T, ReelError>;

/// Coarse classification of a [`ReelError`], reported to callers on failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A media item vanished between discovery and render.
    MissingSource,
    /// A file extension or content was not recognized.
    UnsupportedFormat,
    /// The external encoder failed or timed out.
    Encoder,
    /// An artifact could not be written into the cache.
    CacheWrite,
    /// The soundtrack could not be read. Only ever surfaced as a warning.
    MissingSoundtrack,
    /// Invalid configuration or caller input.
    Validation,
    /// Anything else.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MissingSource => "missing_source",
            Self::UnsupportedFormat => "unsupported_format",
            Self::Encoder => "encoder",
            Self::CacheWrite => "cache_write",
            Self::MissingSoundtrack => "missing_soundtrack",
            Self::Validation => "validation",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Identifies one render unit (slide or transition) in error reports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitLabel {
    /// Position of the unit in its phase (0-based).
    pub ordinal: usize,
    /// Human-readable unit kind, e.g. `"photo slide"` or `"transition"`.
    pub kind: &'static str,
}

impl fmt::Display for UnitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.kind, self.ordinal)
    }
}

/// Top-level error taxonomy used by slidereel APIs.
#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    /// A referenced media file no longer exists.
    #[error("missing source: '{}'", .0.display())]
    MissingSource(PathBuf),

    /// The file is not a recognized photo or video.
    #[error("unsupported format: '{}'", .0.display())]
    UnsupportedFormat(PathBuf),

    /// The external encoder failed.
    #[error("encoder error: {0}")]
    Encoder(#[from] EncoderError),

    /// Publishing an artifact into the cache failed.
    #[error("cache write error: {0}")]
    CacheWrite(String),

    /// The soundtrack file is missing or unreadable.
    #[error("missing soundtrack: '{}'", .0.display())]
    MissingSoundtrack(PathBuf),

    /// Invalid user-provided configuration or input.
    #[error("validation error: {0}")]
    Validation(String),

    /// A renderer failure tagged with the unit that produced it.
    #[error("{unit} failed: {source}")]
    Unit {
        /// Which unit failed.
        unit: UnitLabel,
        /// Underlying failure.
        #[source]
        source: Box<ReelError>,
    },

    /// Another caller's producer for the same cache key failed while this caller waited on it.
    #[error("concurrent producer for cache key {key} failed: {message}")]
    Concurrent {
        /// Hex cache key.
        key: String,
        /// Kind of the producer's failure.
        kind: ErrorKind,
        /// The producer's error message.
        message: String,
    },

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelError {
    /// Build a [`ReelError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`ReelError::CacheWrite`] value.
    pub fn cache_write(msg: impl Into<String>) -> Self {
        Self::CacheWrite(msg.into())
    }

    /// Wrap `self` with the unit that was being rendered.
    pub fn in_unit(self, ordinal: usize, kind: &'static str) -> Self {
        Self::Unit {
            unit: UnitLabel { ordinal, kind },
            source: Box::new(self),
        }
    }

    /// Classify this error. Unit wrappers report the kind of their source.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingSource(_) => ErrorKind::MissingSource,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::Encoder(_) => ErrorKind::Encoder,
            Self::CacheWrite(_) => ErrorKind::CacheWrite,
            Self::MissingSoundtrack(_) => ErrorKind::MissingSoundtrack,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Unit { source, .. } => source.kind(),
            Self::Concurrent { kind, .. } => *kind,
            Self::Other(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
