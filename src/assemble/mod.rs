//! Final assembly: concatenation, soundtrack, output publish.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::Utc;

use crate::cache::entry::Artifact;
use crate::encode::gateway::{EncodeJob, EncodeRequest, EncoderGateway};
use crate::encode::profile::EncodingProfile;
use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{ReelError, ReelResult};
use crate::foundation::fs::{TempFileGuard, ensure_parent_dir, unique_name};

use self::metadata::{OutputMetadata, SegmentKind, SegmentRecord};

/// `<video>.metadata.json` sidecar.
pub mod metadata;

/// Soundtrack fade-in and fade-out length.
pub const SOUNDTRACK_FADE_SECS: f64 = 1.0;

/// One rendered clip in timeline order.
#[derive(Clone, Debug)]
pub struct Segment {
    /// Slide or transition.
    pub kind: SegmentKind,
    /// Source file names, for metadata.
    pub source: String,
    /// The cached clip.
    pub artifact: Artifact,
    /// Clip length in seconds.
    pub duration_secs: f64,
    /// Identity of the profile the clip was encoded with.
    pub profile_id: String,
}

/// Result of a successful assembly.
#[derive(Clone, Debug)]
pub struct Assembled {
    /// Published video.
    pub path: PathBuf,
    /// Published metadata sidecar.
    pub metadata_path: PathBuf,
    /// Total length in seconds.
    pub duration_secs: f64,
    /// Non-fatal problems, e.g. an unreadable soundtrack.
    pub warnings: Vec<String>,
}

/// Concatenates clips and mixes the soundtrack into the final video.
pub struct Assembler<'a> {
    encoder: &'a dyn EncoderGateway,
    profile: &'a EncodingProfile,
    canvas: Canvas,
    fps: Fps,
}

impl<'a> Assembler<'a> {
    /// Assembler writing `profile`-encoded output at `canvas`/`fps`.
    pub fn new(
        encoder: &'a dyn EncoderGateway,
        profile: &'a EncodingProfile,
        canvas: Canvas,
        fps: Fps,
    ) -> Self {
        Self {
            encoder,
            profile,
            canvas,
            fps,
        }
    }

    /// Number of progress units [`Assembler::assemble`] reports for `segments`.
    pub fn unit_count(segments: usize) -> u64 {
        segments as u64 + 1
    }

    /// Produce `output` from `segments`.
    ///
    /// Segments are stream-copied when every one was encoded with this assembler's profile and
    /// re-encoded otherwise. The soundtrack is looped to the video length, trimmed, faded in and
    /// out, and muxed; a missing or unreadable soundtrack becomes a warning and a silent track.
    /// `output` only appears once complete. `on_units` receives completed progress units.
    #[tracing::instrument(skip_all, fields(segments = segments.len(), out = %output.display()))]
    pub fn assemble(
        &self,
        segments: &[Segment],
        soundtrack: Option<&Path>,
        output: &Path,
        on_units: &mut dyn FnMut(u64),
    ) -> ReelResult<Assembled> {
        if segments.is_empty() {
            return Err(ReelError::validation("nothing to assemble: no segments"));
        }
        for seg in segments {
            if !seg.artifact.path.is_file() {
                return Err(ReelError::MissingSource(seg.artifact.path.clone()));
            }
        }
        ensure_parent_dir(output)?;

        let mut warnings = Vec::new();
        let profile_id = self.profile.id();
        let reencode = segments.iter().any(|s| s.profile_id != profile_id);
        if reencode {
            tracing::info!("segments use mixed encoding profiles, re-encoding during concat");
        }
        let duration_secs: f64 = segments.iter().map(|s| s.duration_secs).sum();

        let concat_tmp = sibling_temp(output, "concat");
        let _concat_guard = TempFileGuard(Some(concat_tmp.clone()));
        self.run(
            EncodeJob::Concat {
                inputs: segments.iter().map(|s| s.artifact.path.clone()).collect(),
                reencode,
            },
            &concat_tmp,
        )?;
        on_units(segments.len() as u64);

        let soundtrack = match soundtrack {
            Some(path) => match self.check_soundtrack(path) {
                Ok(()) => Some(path.to_path_buf()),
                Err(e) => {
                    tracing::warn!(soundtrack = %path.display(), error = %e, "using silent audio");
                    warnings.push(format!("{e}; exporting with silent audio"));
                    None
                }
            },
            None => None,
        };

        let muxed_tmp = sibling_temp(output, "mux");
        let mut muxed_guard = TempFileGuard(Some(muxed_tmp.clone()));
        self.run(
            EncodeJob::Mux {
                video: concat_tmp.clone(),
                soundtrack: soundtrack.clone(),
                duration_secs,
                fade_secs: SOUNDTRACK_FADE_SECS,
            },
            &muxed_tmp,
        )?;
        std::fs::rename(&muxed_tmp, output)
            .with_context(|| format!("failed to publish '{}'", output.display()))?;
        muxed_guard.disarm();

        let metadata_path = OutputMetadata {
            version: metadata::METADATA_VERSION,
            output: output.to_path_buf(),
            created_at: Utc::now(),
            profile_id,
            canvas: self.canvas,
            fps: self.fps,
            soundtrack,
            duration_secs,
            segments: segment_records(segments),
        }
        .write()?;
        on_units(1);

        tracing::info!(duration_secs, "assembled output");
        Ok(Assembled {
            path: output.to_path_buf(),
            metadata_path,
            duration_secs,
            warnings,
        })
    }

    fn run(&self, job: EncodeJob<'_>, out: &Path) -> ReelResult<()> {
        let request = EncodeRequest {
            job,
            canvas: self.canvas,
            fps: self.fps,
            profile: self.profile,
        };
        self.encoder.encode(&request, out)?;
        Ok(())
    }

    fn check_soundtrack(&self, path: &Path) -> ReelResult<()> {
        if !path.is_file() {
            return Err(ReelError::MissingSoundtrack(path.to_path_buf()));
        }
        match self.encoder.probe(path) {
            Ok(info) if info.has_audio => Ok(()),
            Ok(_) => Err(ReelError::MissingSoundtrack(path.to_path_buf())),
            Err(e) => {
                tracing::debug!(error = %e, "soundtrack probe failed");
                Err(ReelError::MissingSoundtrack(path.to_path_buf()))
            }
        }
    }
}

fn sibling_temp(output: &Path, tag: &str) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_owned());
    output.with_file_name(unique_name(&format!(".{stem}.{tag}"), "mp4"))
}

fn segment_records(segments: &[Segment]) -> Vec<SegmentRecord> {
    let mut start = 0.0;
    segments
        .iter()
        .enumerate()
        .map(|(index, seg)| {
            let rec = SegmentRecord {
                index,
                kind: seg.kind,
                source: seg.source.clone(),
                clip: seg.artifact.path.clone(),
                duration_secs: seg.duration_secs,
                start_secs: start,
                end_secs: start + seg.duration_secs,
            };
            start += seg.duration_secs;
            rec
        })
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/assemble/assembler.rs"]
mod tests;
