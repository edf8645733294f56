use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::cache::fingerprint::{Fingerprint, OpKind};

/// Which cache area an artifact lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Finished renderer output (`clips/<key>.mp4`).
    Clip,
    /// Intermediate still (`frames/<key>.png`).
    Frame,
}

impl ArtifactKind {
    /// Subdirectory under the cache root.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Clip => "clips",
            Self::Frame => "frames",
        }
    }

    /// File extension of the artifact.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Clip => "mp4",
            Self::Frame => "png",
        }
    }
}

/// Reference to a published, immutable artifact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    /// Cache key.
    pub key: Fingerprint,
    /// Clip or frame.
    pub kind: ArtifactKind,
    /// Final path under the cache root.
    pub path: PathBuf,
    /// Size in bytes.
    pub bytes: u64,
}

/// Descriptive metadata supplied with a `put`.
#[derive(Clone, Debug)]
pub struct EntryMeta {
    /// Operation that produced the artifact.
    pub op: OpKind,
    /// Human-readable description of the inputs (file names), for inspection only.
    pub source: String,
    /// Scope the key was derived under, when it is not the store's active namespace.
    pub namespace: Option<String>,
}

impl EntryMeta {
    /// Build metadata for `op` over `source`.
    pub fn new(op: OpKind, source: impl Into<String>) -> Self {
        Self {
            op,
            source: source.into(),
            namespace: None,
        }
    }

    /// Record that the key was derived under `namespace`.
    pub fn in_namespace(mut self, namespace: &Namespace) -> Self {
        self.namespace = Some(namespace.scope_id());
        self
    }
}

/// Sidecar record stored next to each artifact as `<key>.json`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CacheEntry {
    /// Cache key.
    pub key: Fingerprint,
    /// Clip or frame.
    pub kind: ArtifactKind,
    /// Artifact path at publish time.
    pub path: PathBuf,
    /// Artifact size in bytes.
    pub bytes: u64,
    /// Producing operation, when known.
    pub op: Option<OpKind>,
    /// Namespace scope (profile id, optionally source set) the key was derived under.
    pub namespace: String,
    /// Input description.
    pub source: String,
    /// Publish time.
    pub created_at: DateTime<Utc>,
    /// Last time a `get` returned this entry.
    pub last_used_at: DateTime<Utc>,
}

/// Cumulative statistics plus a snapshot of the on-disk footprint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// `get` calls that found an entry.
    pub hits: u64,
    /// `get` calls that did not.
    pub misses: u64,
    /// Sum of artifact sizes currently on disk.
    pub total_bytes: u64,
    /// Number of clip entries on disk.
    pub clip_entries: u64,
    /// Number of frame entries on disk.
    pub frame_entries: u64,
}

impl CacheStats {
    /// Hit rate in percent, `0.0` when nothing was looked up yet.
    pub fn hit_rate_percent(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 * 100.0 / total as f64
        }
    }

    /// Clip plus frame entries.
    pub fn entries(&self) -> u64 {
        self.clip_entries + self.frame_entries
    }
}

/// Effective key namespace. Mixed into every key the store derives.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Namespace {
    /// Identity of the encoding profile in use.
    pub profile_id: String,
    /// Optional identifier of the project's media source set.
    pub source_set: Option<String>,
}

impl Namespace {
    /// Namespace scoped to one encoding profile.
    pub fn for_profile(profile_id: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            source_set: None,
        }
    }

    /// The string passed as `profile_id` to the fingerprint function.
    pub fn scope_id(&self) -> String {
        match &self.source_set {
            Some(set) => format!("{}|{set}", self.profile_id),
            None => self.profile_id.clone(),
        }
    }
}

/// What an invalidation switches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvalidationScope {
    /// Switch to another encoding profile identity.
    Profile(String),
    /// Switch to another media source set.
    SourceSet(String),
}
