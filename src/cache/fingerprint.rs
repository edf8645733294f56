use std::collections::BTreeMap;
use std::fmt;
use std::io::Read as _;
use std::path::Path;

use anyhow::Context as _;
use sha2::{Digest as _, Sha256};

use crate::foundation::error::{ReelError, ReelResult};
use crate::media::item::MediaItem;

const DOMAIN_TAG: &[u8] = b"slidereel/fingerprint/v1";

/// SHA-256 cache key. Rendered as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form, used as the on-disk entry name.
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in self.0 {
            s.push(char::from_digit(u32::from(b >> 4), 16).unwrap_or('0'));
            s.push(char::from_digit(u32::from(b & 0x0f), 16).unwrap_or('0'));
        }
        s
    }

    /// Parse the form produced by [`Fingerprint::to_hex`].
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 64 {
            return None;
        }
        let mut out = [0u8; 32];
        for (i, pair) in s.as_bytes().chunks_exact(2).enumerate() {
            let hi = char::from(pair[0]).to_digit(16)?;
            let lo = char::from(pair[1]).to_digit(16)?;
            out[i] = (hi * 16 + lo) as u8;
        }
        Some(Self(out))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..16])
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Self::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid fingerprint hex"))
    }
}

/// Identity of the inputs an operation reads.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceSignature {
    /// Cheap signature: path, size and modification time.
    File {
        /// Path as given at discovery.
        path: String,
        /// Size in bytes.
        size: u64,
        /// Modification time, nanoseconds since the Unix epoch.
        modified_unix_ns: u64,
    },
    /// Content hash, used when the cheap signature is incomplete.
    Content {
        /// Hex SHA-256 of the file bytes.
        sha256: String,
    },
    /// Several sources read together, in order.
    Group {
        /// Member signatures.
        members: Vec<SourceSignature>,
    },
    /// Inputs that are themselves cache artifacts.
    Derived {
        /// Keys of the input artifacts, in order.
        inputs: Vec<Fingerprint>,
    },
}

impl SourceSignature {
    /// Cheap signature for `item`, falling back to hashing its content when the filesystem did
    /// not report a modification time.
    pub fn of_item(item: &MediaItem) -> ReelResult<Self> {
        match item.modified_unix_ns {
            Some(modified_unix_ns) => Ok(Self::File {
                path: item.path.to_string_lossy().into_owned(),
                size: item.size_bytes,
                modified_unix_ns,
            }),
            None => Self::content_of(&item.path),
        }
    }

    /// Signature over several items, in order.
    pub fn of_items(items: &[MediaItem]) -> ReelResult<Self> {
        let members = items
            .iter()
            .map(Self::of_item)
            .collect::<ReelResult<Vec<_>>>()?;
        Ok(Self::Group { members })
    }

    /// Content-hash signature of the file at `path`.
    pub fn content_of(path: &Path) -> ReelResult<Self> {
        let mut f = std::fs::File::open(path)
            .map_err(|_| ReelError::MissingSource(path.to_path_buf()))?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = f
                .read(&mut buf)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let digest: [u8; 32] = hasher.finalize().into();
        Ok(Self::Content {
            sha256: Fingerprint(digest).to_hex(),
        })
    }
}

/// Operation producing a cached artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// Still photo looped into a clip.
    PhotoSlide,
    /// Trimmed and normalized video clip.
    VideoSlide,
    /// 70/30 composite still built from three photos.
    CompositeFrame,
    /// Composite still looped into a clip.
    CompositeSlide,
    /// First or last frame extracted from a clip.
    BoundaryFrame,
    /// Transition clip between two slides.
    Transition,
}

impl OpKind {
    /// Stable identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PhotoSlide => "photo_slide",
            Self::VideoSlide => "video_slide",
            Self::CompositeFrame => "composite_frame",
            Self::CompositeSlide => "composite_slide",
            Self::BoundaryFrame => "boundary_frame",
            Self::Transition => "transition",
        }
    }
}

/// One operation parameter value.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float. Hashed by bit pattern, so `0.0` and `-0.0` differ.
    Float(f64),
    /// String.
    Str(String),
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Operation parameters, kept in key order so hashing is canonical.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OpParams(BTreeMap<String, ParamValue>);

impl OpParams {
    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.0.insert(key.to_owned(), value.into());
        self
    }

    /// Add every entry of `other`, replacing duplicates.
    pub fn merged(mut self, other: &OpParams) -> Self {
        self.0
            .extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Look up a parameter.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }
}

/// Derive the cache key for an operation.
///
/// Pure: the result depends only on the arguments, never on time, process or directory order.
pub fn fingerprint(
    source: &SourceSignature,
    op: OpKind,
    params: &OpParams,
    profile_id: &str,
) -> Fingerprint {
    let mut h = StableHasher::new();
    h.write_bytes(DOMAIN_TAG);
    write_source(&mut h, source);
    h.write_str(op.as_str());
    h.write_u64(params.0.len() as u64);
    for (k, v) in &params.0 {
        h.write_str(k);
        write_param(&mut h, v);
    }
    h.write_str(profile_id);
    h.finish()
}

struct StableHasher {
    inner: Sha256,
}

impl StableHasher {
    fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    // Length-prefixed so adjacent strings cannot alias.
    fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.write_bytes(s.as_bytes());
    }

    fn finish(self) -> Fingerprint {
        Fingerprint(self.inner.finalize().into())
    }
}

fn write_source(h: &mut StableHasher, source: &SourceSignature) {
    match source {
        SourceSignature::File {
            path,
            size,
            modified_unix_ns,
        } => {
            h.write_u8(0);
            h.write_str(path);
            h.write_u64(*size);
            h.write_u64(*modified_unix_ns);
        }
        SourceSignature::Content { sha256 } => {
            h.write_u8(1);
            h.write_str(sha256);
        }
        SourceSignature::Group { members } => {
            h.write_u8(2);
            h.write_u64(members.len() as u64);
            for m in members {
                write_source(h, m);
            }
        }
        SourceSignature::Derived { inputs } => {
            h.write_u8(3);
            h.write_u64(inputs.len() as u64);
            for k in inputs {
                h.write_bytes(k.as_bytes());
            }
        }
    }
}

fn write_param(h: &mut StableHasher, v: &ParamValue) {
    match v {
        ParamValue::Bool(b) => {
            h.write_u8(0);
            h.write_u8(u8::from(*b));
        }
        ParamValue::Int(i) => {
            h.write_u8(1);
            h.write_bytes(&i.to_le_bytes());
        }
        ParamValue::Float(f) => {
            h.write_u8(2);
            h.write_f64(*f);
        }
        ParamValue::Str(s) => {
            h.write_u8(3);
            h.write_str(s);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/fingerprint.rs"]
mod tests;
