use std::path::{Path, PathBuf};

use crate::encode::profile::EncodingProfile;
use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::ReelResult;

/// Stream facts reported by [`EncoderGateway::probe`].
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MediaInfo {
    /// Container duration in seconds.
    pub duration_secs: f64,
    /// Width of the first video stream, `0` if there is none.
    pub width: u32,
    /// Height of the first video stream, `0` if there is none.
    pub height: u32,
    /// Whether the file carries at least one audio stream.
    pub has_audio: bool,
}

/// Failure of one external encoder invocation.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum EncoderError {
    /// The encoder process could not be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Executable name.
        program: String,
        /// OS error text.
        message: String,
    },
    /// The encoder ran and exited unsuccessfully.
    #[error("encoder exited with status {}: {stderr}", exit_code.map_or_else(|| "signal".to_owned(), |c| c.to_string()))]
    Failed {
        /// Exit code, `None` when killed by a signal.
        exit_code: Option<i32>,
        /// Trimmed stderr output.
        stderr: String,
    },
    /// The encoder did not finish within the configured timeout and was killed.
    #[error("encoder timed out after {secs}s")]
    Timeout {
        /// Timeout that elapsed.
        secs: u64,
    },
    /// Talking to the encoder (pipes, temp files) failed.
    #[error("encoder io error: {0}")]
    Io(String),
    /// The encoder's output could not be interpreted.
    #[error("unexpected encoder output: {0}")]
    Output(String),
}

/// Which frame of a clip to extract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePosition {
    /// The first decoded frame.
    First,
    /// A frame from the final tenth of a second.
    Last,
}

/// Generator of raw RGB24 frames for [`EncodeJob::FrameSequence`].
pub trait FrameSource: Sync {
    /// Total number of frames.
    fn frame_count(&self) -> u32;
    /// Write frame `index` into `rgb` (`width * height * 3` bytes, canvas-sized).
    fn render_frame(&self, index: u32, rgb: &mut [u8]) -> ReelResult<()>;
}

/// Work handed to the encoder.
pub enum EncodeJob<'a> {
    /// Loop a still image for `duration_secs`, letterboxed into the canvas.
    StillClip {
        /// Image path.
        image: PathBuf,
        /// Clip length.
        duration_secs: f64,
    },
    /// Trim a video to `duration_secs`, fps-normalized and letterboxed, audio dropped.
    VideoClip {
        /// Source video.
        source: PathBuf,
        /// Clip length.
        duration_secs: f64,
    },
    /// Encode CPU-generated canvas-sized frames.
    FrameSequence {
        /// Frame generator.
        frames: &'a dyn FrameSource,
    },
    /// Extract one frame as a PNG.
    ExtractFrame {
        /// Source clip.
        source: PathBuf,
        /// Which frame.
        position: FramePosition,
    },
    /// Concatenate clips in order.
    Concat {
        /// Input clips.
        inputs: Vec<PathBuf>,
        /// Re-encode instead of stream copy (inputs use differing profiles).
        reencode: bool,
    },
    /// Attach audio to a finished video.
    Mux {
        /// Concatenated video.
        video: PathBuf,
        /// Soundtrack to loop, trim and fade, or `None` for a silent track.
        soundtrack: Option<PathBuf>,
        /// Total video duration.
        duration_secs: f64,
        /// Length of the soundtrack fade-in and fade-out.
        fade_secs: f64,
    },
}

impl EncodeJob<'_> {
    /// Short name for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::StillClip { .. } => "still_clip",
            Self::VideoClip { .. } => "video_clip",
            Self::FrameSequence { .. } => "frame_sequence",
            Self::ExtractFrame { .. } => "extract_frame",
            Self::Concat { .. } => "concat",
            Self::Mux { .. } => "mux",
        }
    }
}

/// One encoder invocation: the job plus the output format it must honor.
pub struct EncodeRequest<'a> {
    /// What to produce.
    pub job: EncodeJob<'a>,
    /// Output canvas.
    pub canvas: Canvas,
    /// Output frame rate.
    pub fps: Fps,
    /// Output encoder settings.
    pub profile: &'a EncodingProfile,
}

/// Boundary to the external media encoder.
///
/// Implementations block for the duration of the encode and must bound it with a timeout.
pub trait EncoderGateway: Send + Sync {
    /// Run `request`, writing the result to `output`.
    fn encode(&self, request: &EncodeRequest<'_>, output: &Path) -> Result<(), EncoderError>;

    /// Inspect a media file.
    fn probe(&self, path: &Path) -> Result<MediaInfo, EncoderError>;
}
