use std::io::{Read, Write as _};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, Sender, TrySendError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::encode::gateway::{
    EncodeJob, EncodeRequest, EncoderError, EncoderGateway, FramePosition, FrameSource, MediaInfo,
};
use crate::foundation::core::Canvas;

const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// Backoff while the frame queue is full.
const QUEUE_BACKOFF: Duration = Duration::from_millis(2);
/// Rendered frames allowed to wait for the stdin writer.
const FRAME_QUEUE: usize = 4;
const SILENT_AUDIO: &str = "anullsrc=channel_layout=stereo:sample_rate=48000";

/// [`EncoderGateway`] backed by the system `ffmpeg` and `ffprobe` executables.
#[derive(Clone, Debug)]
pub struct FfmpegGateway {
    ffmpeg: String,
    ffprobe: String,
    timeout: Duration,
}

impl FfmpegGateway {
    /// Gateway invoking `ffmpeg`/`ffprobe` from `PATH`, killing any invocation after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            ffmpeg: "ffmpeg".to_owned(),
            ffprobe: "ffprobe".to_owned(),
            timeout,
        }
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-y", "-hide_banner", "-loglevel", "error"]);
        cmd
    }

    fn build(&self, req: &EncodeRequest<'_>, out: &Path) -> Result<Command, EncoderError> {
        let fps = req.fps.ffmpeg_arg();
        let mut cmd = self.base_command();
        match &req.job {
            EncodeJob::StillClip {
                image,
                duration_secs,
            } => {
                cmd.args(["-loop", "1", "-framerate", &fps, "-t"])
                    .arg(secs(*duration_secs))
                    .arg("-i")
                    .arg(image)
                    .args(["-vf", &letterbox_filter(req.canvas, &fps), "-an"])
                    .args(req.profile.video_args())
                    .args(["-r", &fps, "-movflags", "+faststart", "-f", "mp4"]);
            }
            EncodeJob::VideoClip {
                source,
                duration_secs,
            } => {
                cmd.arg("-i")
                    .arg(source)
                    .arg("-t")
                    .arg(secs(*duration_secs))
                    .args(["-vf", &letterbox_filter(req.canvas, &fps), "-an"])
                    .args(req.profile.video_args())
                    .args(["-r", &fps, "-movflags", "+faststart", "-f", "mp4"]);
            }
            EncodeJob::FrameSequence { .. } => {
                cmd.args([
                    "-f",
                    "rawvideo",
                    "-pix_fmt",
                    "rgb24",
                    "-s",
                    &format!("{}x{}", req.canvas.width, req.canvas.height),
                    "-r",
                    &fps,
                    "-i",
                    "pipe:0",
                    "-an",
                ])
                .args(req.profile.video_args())
                .args(["-movflags", "+faststart", "-f", "mp4"]);
            }
            EncodeJob::ExtractFrame { source, position } => {
                if *position == FramePosition::Last {
                    cmd.args(["-sseof", "-0.1"]);
                }
                cmd.arg("-i").arg(source);
                if *position == FramePosition::First {
                    cmd.args(["-frames:v", "1"]);
                }
                cmd.args(["-update", "1", "-c:v", "png", "-f", "image2"]);
            }
            EncodeJob::Concat { inputs, reencode } => {
                let list = concat_list_path(out);
                write_concat_list(&list, inputs)?;
                cmd.args(["-f", "concat", "-safe", "0", "-i"]).arg(&list);
                if *reencode {
                    cmd.args(req.profile.video_args()).args(["-r", &fps, "-an"]);
                } else {
                    cmd.args(["-c", "copy"]);
                }
                cmd.args(["-movflags", "+faststart", "-f", "mp4"]);
            }
            EncodeJob::Mux {
                video,
                soundtrack,
                duration_secs,
                fade_secs,
            } => {
                cmd.arg("-i").arg(video);
                match soundtrack {
                    Some(audio) => {
                        let fade_out_start = (duration_secs - fade_secs).max(0.0);
                        cmd.args(["-stream_loop", "-1", "-i"]).arg(audio).args([
                            "-af",
                            &format!(
                                "afade=t=in:st=0:d={},afade=t=out:st={}:d={}",
                                secs(*fade_secs),
                                secs(fade_out_start),
                                secs(*fade_secs)
                            ),
                        ]);
                    }
                    None => {
                        cmd.args(["-f", "lavfi", "-i", SILENT_AUDIO]);
                    }
                }
                cmd.args(["-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy", "-c:a", "aac"])
                    .args(["-b:a", &format!("{}k", req.profile.audio_bitrate_kbps)])
                    .arg("-t")
                    .arg(secs(*duration_secs))
                    .args(["-movflags", "+faststart", "-f", "mp4"]);
            }
        }
        cmd.arg(out);
        Ok(cmd)
    }

    fn run(
        &self,
        cmd: &mut Command,
        frames: Option<(&dyn FrameSource, usize)>,
    ) -> Result<(), EncoderError> {
        cmd.stdin(if frames.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| EncoderError::Spawn {
            program: self.ffmpeg.clone(),
            message: e.to_string(),
        })?;
        let stderr = match drain(child.stderr.take(), "ffmpeg stderr") {
            Ok(handle) => handle,
            Err(e) => {
                abort(&mut child);
                return Err(e);
            }
        };
        let deadline = Instant::now() + self.timeout;

        let writer = match frames {
            Some((source, frame_len)) => {
                match self.pipe_frames(&mut child, source, frame_len, deadline) {
                    Ok(writer) => Some(writer),
                    Err(e) => {
                        abort(&mut child);
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        let status = self.wait(&mut child, deadline, "ffmpeg")?;
        let stderr_bytes = collect(stderr, "ffmpeg stderr")?;
        // A write failure means ffmpeg exited early; its stderr explains why.
        let write_result = match writer {
            Some(handle) => handle
                .join()
                .map_err(|_| EncoderError::Io("ffmpeg stdin writer thread panicked".into()))?,
            None => Ok(()),
        };

        if !status.success() {
            return Err(EncoderError::Failed {
                exit_code: status.code(),
                stderr: String::from_utf8_lossy(&stderr_bytes).trim().to_owned(),
            });
        }
        write_result.map_err(EncoderError::Io)
    }

    /// Render frames on the calling thread and queue them to a writer thread owning ffmpeg's
    /// stdin, so the deadline is checked even while ffmpeg stops reading.
    ///
    /// Returns the writer once every frame is queued or the writer has stopped. Dropping the
    /// queue closes stdin after the last frame is written.
    fn pipe_frames(
        &self,
        child: &mut Child,
        source: &dyn FrameSource,
        frame_len: usize,
        deadline: Instant,
    ) -> Result<JoinHandle<Result<(), String>>, EncoderError> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EncoderError::Io("failed to open ffmpeg stdin (unexpected)".into()))?;
        let (queue, queued) = mpsc::sync_channel::<Vec<u8>>(FRAME_QUEUE);
        let (recycle, recycled) = mpsc::channel::<Vec<u8>>();
        let writer = std::thread::spawn(move || write_frames(stdin, queued, recycle));

        for idx in 0..source.frame_count() {
            if Instant::now() >= deadline {
                return Err(self.timeout_error());
            }
            let mut buf = recycled
                .try_recv()
                .unwrap_or_else(|_| vec![0u8; frame_len]);
            source
                .render_frame(idx, &mut buf)
                .map_err(|e| EncoderError::Io(format!("failed to render frame {idx}: {e}")))?;
            loop {
                match queue.try_send(buf) {
                    Ok(()) => break,
                    Err(TrySendError::Full(back)) => {
                        if Instant::now() >= deadline {
                            return Err(self.timeout_error());
                        }
                        buf = back;
                        std::thread::sleep(QUEUE_BACKOFF);
                    }
                    // Writer gave up; its error is reported once ffmpeg has exited.
                    Err(TrySendError::Disconnected(_)) => return Ok(writer),
                }
            }
        }
        Ok(writer)
    }

    /// Wait for `child` until `deadline`, killing it on timeout.
    ///
    /// Pipe readers are not joined after a kill: a grandchild may still hold the pipes open.
    fn wait(
        &self,
        child: &mut Child,
        deadline: Instant,
        program: &str,
    ) -> Result<ExitStatus, EncoderError> {
        match wait_until(child, deadline) {
            Ok(Some(status)) => Ok(status),
            Ok(None) => {
                abort(child);
                Err(self.timeout_error())
            }
            Err(e) => {
                abort(child);
                Err(EncoderError::Io(format!("failed to wait for {program}: {e}")))
            }
        }
    }

    fn timeout_error(&self) -> EncoderError {
        EncoderError::Timeout {
            secs: self.timeout.as_secs(),
        }
    }
}

impl EncoderGateway for FfmpegGateway {
    fn encode(&self, request: &EncodeRequest<'_>, output: &Path) -> Result<(), EncoderError> {
        let mut cmd = self.build(request, output)?;
        tracing::debug!(job = request.job.label(), out = %output.display(), "running ffmpeg");
        let frames = match &request.job {
            EncodeJob::FrameSequence { frames } => Some((
                *frames,
                request.canvas.width as usize * request.canvas.height as usize * 3,
            )),
            _ => None,
        };
        let result = self.run(&mut cmd, frames);
        if let EncodeJob::Concat { .. } = &request.job {
            let _ = std::fs::remove_file(concat_list_path(output));
        }
        result
    }

    fn probe(&self, path: &Path) -> Result<MediaInfo, EncoderError> {
        #[derive(serde::Deserialize)]
        struct ProbeStream {
            codec_type: Option<String>,
            width: Option<u32>,
            height: Option<u32>,
        }

        #[derive(serde::Deserialize)]
        struct ProbeFormat {
            duration: Option<String>,
        }

        #[derive(serde::Deserialize)]
        struct ProbeOut {
            #[serde(default)]
            streams: Vec<ProbeStream>,
            format: Option<ProbeFormat>,
        }

        let mut child = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EncoderError::Spawn {
                program: self.ffprobe.clone(),
                message: e.to_string(),
            })?;
        let pipes = drain(child.stdout.take(), "ffprobe stdout")
            .and_then(|out| Ok((out, drain(child.stderr.take(), "ffprobe stderr")?)));
        let (stdout, stderr) = match pipes {
            Ok(pipes) => pipes,
            Err(e) => {
                abort(&mut child);
                return Err(e);
            }
        };
        let status = self.wait(&mut child, Instant::now() + self.timeout, "ffprobe")?;
        let stdout = collect(stdout, "ffprobe stdout")?;
        let stderr = collect(stderr, "ffprobe stderr")?;
        if !status.success() {
            return Err(EncoderError::Failed {
                exit_code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_owned(),
            });
        }

        let parsed: ProbeOut = serde_json::from_slice(&stdout)
            .map_err(|e| EncoderError::Output(format!("ffprobe json parse failed: {e}")))?;
        let video = parsed
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"));
        let duration_secs = parsed
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse::<f64>().ok())
            .ok_or_else(|| {
                EncoderError::Output(format!("missing duration for '{}'", path.display()))
            })?;
        Ok(MediaInfo {
            duration_secs,
            width: video.and_then(|s| s.width).unwrap_or(0),
            height: video.and_then(|s| s.height).unwrap_or(0),
            has_audio: parsed
                .streams
                .iter()
                .any(|s| s.codec_type.as_deref() == Some("audio")),
        })
    }
}

fn wait_until(child: &mut Child, deadline: Instant) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn abort(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R>(
    pipe: Option<R>,
    what: &str,
) -> Result<JoinHandle<std::io::Result<Vec<u8>>>, EncoderError>
where
    R: Read + Send + 'static,
{
    let mut pipe =
        pipe.ok_or_else(|| EncoderError::Io(format!("failed to open {what} (unexpected)")))?;
    Ok(std::thread::spawn(move || {
        let mut bytes = Vec::new();
        pipe.read_to_end(&mut bytes)?;
        Ok(bytes)
    }))
}

fn collect(
    handle: JoinHandle<std::io::Result<Vec<u8>>>,
    what: &str,
) -> Result<Vec<u8>, EncoderError> {
    handle
        .join()
        .map_err(|_| EncoderError::Io(format!("{what} drain thread panicked")))?
        .map_err(|e| EncoderError::Io(format!("{what} read failed: {e}")))
}

/// Write queued frames to ffmpeg's stdin, handing each buffer back for reuse.
fn write_frames(
    mut stdin: ChildStdin,
    frames: Receiver<Vec<u8>>,
    recycle: Sender<Vec<u8>>,
) -> Result<(), String> {
    for (idx, frame) in frames.iter().enumerate() {
        stdin
            .write_all(&frame)
            .map_err(|e| format!("failed to write frame {idx} to ffmpeg stdin: {e}"))?;
        let _ = recycle.send(frame);
    }
    Ok(())
}

/// Scale to fit, pad to the canvas centered on black, normalize SAR, frame rate and pixel format.
fn letterbox_filter(canvas: Canvas, fps: &str) -> String {
    let (w, h) = (canvas.width, canvas.height);
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black,setsar=1,fps={fps},format=yuv420p"
    )
}

fn secs(v: f64) -> String {
    format!("{v:.3}")
}

fn concat_list_path(out: &Path) -> std::path::PathBuf {
    let mut name = out.file_name().unwrap_or_default().to_os_string();
    name.push(".concat.txt");
    out.with_file_name(name)
}

fn write_concat_list(list: &Path, inputs: &[std::path::PathBuf]) -> Result<(), EncoderError> {
    let mut body = String::new();
    for input in inputs {
        let abs = std::path::absolute(input).map_err(|e| {
            EncoderError::Io(format!("failed to resolve '{}': {e}", input.display()))
        })?;
        let escaped = abs.to_string_lossy().replace('\'', "'\\''");
        body.push_str(&format!("file '{escaped}'\n"));
    }
    std::fs::write(list, body)
        .map_err(|e| EncoderError::Io(format!("failed to write '{}': {e}", list.display())))
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
