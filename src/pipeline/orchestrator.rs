use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use rayon::prelude::*;

use crate::assemble::metadata::SegmentKind;
use crate::assemble::{Assembler, Segment};
use crate::cache::entry::{Artifact, Namespace};
use crate::cache::store::CacheStore;
use crate::config::ExportConfig;
use crate::encode::ffmpeg::FfmpegGateway;
use crate::encode::gateway::EncoderGateway;
use crate::foundation::cancel::CancelToken;
use crate::foundation::error::{ErrorKind, ReelError, ReelResult};
use crate::media::discover::discover_media;
use crate::media::item::MediaItem;
use crate::pipeline::progress::{Phase, ProgressEvent, ProgressReporter};
use crate::render::RenderContext;
use crate::render::slide::render_slide;
use crate::render::transition::render_transition;
use crate::sequence::slide::{Slide, sequence_slides};

/// Unit-level render parallelism.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderThreading {
    /// Render slides (then transitions) on a rayon pool when `true`.
    pub parallel: bool,
    /// Optional explicit worker thread count.
    pub threads: Option<usize>,
}

/// Lifecycle of one export.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportState {
    /// Created, not started.
    Idle,
    /// Scanning media.
    Discovering,
    /// Building slides.
    Sequencing,
    /// Rendering slide and transition clips.
    Rendering,
    /// Concatenating and muxing.
    Assembling,
    /// Output published.
    Done,
    /// Stopped on request.
    Cancelled,
    /// Stopped by an error.
    Failed,
}

impl ExportState {
    /// `Done`, `Cancelled` and `Failed` are absorbing.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_advance_to(self, next: Self) -> bool {
        use ExportState::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Cancelled | Failed)
                | (Idle, Discovering)
                | (Discovering, Sequencing)
                | (Sequencing, Rendering)
                | (Rendering, Assembling)
                | (Assembling, Done)
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Sequencing => "sequencing",
            Self::Rendering => "rendering",
            Self::Assembling => "assembling",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current [`ExportState`], rejecting illegal transitions.
#[derive(Debug)]
pub struct ExportStateMachine {
    state: ExportState,
}

impl Default for ExportStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportStateMachine {
    /// Machine in [`ExportState::Idle`].
    pub fn new() -> Self {
        Self {
            state: ExportState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> ExportState {
        self.state
    }

    /// Move to `next`, or fail leaving the state unchanged.
    pub fn advance(&mut self, next: ExportState) -> ReelResult<()> {
        if !self.state.can_advance_to(next) {
            return Err(ReelError::Other(anyhow::anyhow!(
                "illegal export state transition {} -> {next}",
                self.state
            )));
        }
        self.state = next;
        Ok(())
    }
}

/// Terminal result of an export.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// The published video.
    Success(PathBuf),
    /// Stopped on request. Published cache entries are kept.
    Cancelled,
    /// Stopped by an error.
    Failure {
        /// Error category.
        kind: ErrorKind,
        /// Human-readable description, including the failing unit when there is one.
        detail: String,
    },
}

impl Outcome {
    fn from_error(err: &ReelError) -> Self {
        Self::Failure {
            kind: err.kind(),
            detail: err.to_string(),
        }
    }
}

/// Events streamed from a running export.
#[derive(Clone, Debug, PartialEq)]
pub enum ExportEvent {
    /// The export entered a new state.
    State(ExportState),
    /// A unit finished.
    Progress(ProgressEvent),
    /// A non-fatal problem.
    Warning(String),
    /// Last event of every export.
    Finished(Outcome),
}

/// Media to export.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaInput {
    /// Every supported file in a folder, sorted by name.
    Folder(PathBuf),
    /// Explicit files, in the given order.
    Files(Vec<PathBuf>),
}

/// Runs exports against one cache and encoder.
#[derive(Clone)]
pub struct Exporter {
    cache: Arc<CacheStore>,
    encoder: Arc<dyn EncoderGateway>,
}

impl Exporter {
    /// Exporter over an explicit cache and encoder.
    pub fn new(cache: Arc<CacheStore>, encoder: Arc<dyn EncoderGateway>) -> Self {
        Self { cache, encoder }
    }

    /// Shared cache.
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Start exporting `input` on a dedicated worker thread.
    ///
    /// Never blocks. Events, including the final [`ExportEvent::Finished`], arrive on the
    /// handle's receiver.
    pub fn export(&self, input: MediaInput, config: ExportConfig) -> ExportHandle {
        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        let job = ExportJob {
            cache: Arc::clone(&self.cache),
            encoder: Arc::clone(&self.encoder),
            input,
            config,
            cancel: cancel.clone(),
            events: tx,
        };
        let join = std::thread::spawn(move || job.run());
        ExportHandle {
            events: rx,
            cancel,
            join,
        }
    }
}

/// Export with the ffmpeg gateway and the cache named by `config`.
pub fn export(input: MediaInput, config: ExportConfig) -> ReelResult<ExportHandle> {
    config.validate()?;
    let profile = config.profile()?;
    let cache = Arc::new(CacheStore::open(
        config.cache_root(),
        Namespace::for_profile(profile.id()),
    )?);
    let encoder: Arc<dyn EncoderGateway> = Arc::new(FfmpegGateway::new(config.encoder_timeout()));
    Ok(Exporter::new(cache, encoder).export(input, config))
}

/// Caller side of a running export.
pub struct ExportHandle {
    events: Receiver<ExportEvent>,
    cancel: CancelToken,
    join: JoinHandle<Outcome>,
}

impl ExportHandle {
    /// Event stream. Ends after [`ExportEvent::Finished`].
    pub fn events(&self) -> &Receiver<ExportEvent> {
        &self.events
    }

    /// Request cancellation. Units already running finish; no new unit starts.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this export.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// `true` once the worker has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Block until the export ends, discarding undelivered events.
    pub fn wait(self) -> Outcome {
        join_outcome(self.join)
    }

    /// Block until the export ends, returning every event not yet received.
    pub fn collect(self) -> (Vec<ExportEvent>, Outcome) {
        let events: Vec<ExportEvent> = self.events.iter().collect();
        (events, join_outcome(self.join))
    }
}

fn join_outcome(join: JoinHandle<Outcome>) -> Outcome {
    join.join().unwrap_or_else(|_| Outcome::Failure {
        kind: ErrorKind::Internal,
        detail: "export worker panicked".to_owned(),
    })
}

struct ExportJob {
    cache: Arc<CacheStore>,
    encoder: Arc<dyn EncoderGateway>,
    input: MediaInput,
    config: ExportConfig,
    cancel: CancelToken,
    events: Sender<ExportEvent>,
}

/// `None` when the export was cancelled.
type Flow<T> = ReelResult<Option<T>>;

impl ExportJob {
    #[tracing::instrument(skip_all, fields(project = %self.config.project_name))]
    fn run(self) -> Outcome {
        let progress = ProgressReporter::new(self.events.clone());
        let mut machine = ExportStateMachine::new();

        let outcome = match self.execute(&mut machine, &progress) {
            Ok(Some(path)) => Outcome::Success(path),
            Ok(None) => {
                progress.mark_cancelled();
                self.enter(&mut machine, ExportState::Cancelled);
                Outcome::Cancelled
            }
            Err(e) => {
                tracing::error!(error = %e, "export failed");
                self.enter(&mut machine, ExportState::Failed);
                Outcome::from_error(&e)
            }
        };
        if !matches!(outcome, Outcome::Success(_)) {
            self.cache.purge_temp();
        }

        let state = progress.state();
        tracing::info!(
            state = %machine.state(),
            fraction = state.fraction,
            cancelled = state.cancelled,
            "export finished"
        );
        self.emit(ExportEvent::Finished(outcome.clone()));
        outcome
    }

    fn execute(
        &self,
        machine: &mut ExportStateMachine,
        progress: &ProgressReporter,
    ) -> Flow<PathBuf> {
        self.config.validate()?;
        let profile = self.config.profile()?;
        let requested = self.config.canvas()?;
        let canvas = profile.clamp_canvas(requested);
        let fps = profile.clamp_fps(self.config.fps()?);
        if canvas != requested {
            tracing::info!(
                width = canvas.width,
                height = canvas.height,
                profile = %profile.name,
                "resolution clamped to profile ceiling"
            );
        }
        let profile_id = profile.id();
        // Per-run scope: other exports sharing the store may use other profiles.
        let namespace = Namespace {
            profile_id: profile_id.clone(),
            source_set: self.cache.namespace().source_set,
        };
        tracing::debug!(namespace = %namespace.scope_id(), "cache key scope");

        self.try_enter(machine, ExportState::Discovering)?;
        let Some(items) = self.discover(progress)? else {
            return Ok(None);
        };

        self.try_enter(machine, ExportState::Sequencing)?;
        let sequence = sequence_slides(&items, &self.config.sequence_settings(), |item| {
            self.encoder.probe(&item.path).map(|info| info.duration_secs)
        })?;
        for warning in sequence.warnings {
            self.warn(warning);
        }
        let slides = sequence.slides;
        if slides.is_empty() {
            return Err(ReelError::validation("no usable media to export"));
        }
        let transitions = slides.len() - 1;
        progress.set_total(Phase::SlideRender, slides.len() as u64);
        progress.set_total(Phase::TransitionRender, transitions as u64);
        progress.set_total(
            Phase::Assembly,
            Assembler::unit_count(slides.len() + transitions),
        );
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        self.try_enter(machine, ExportState::Rendering)?;
        let ctx = RenderContext {
            cache: &self.cache,
            namespace: &namespace,
            encoder: self.encoder.as_ref(),
            profile: &profile,
            canvas,
            fps,
        };
        let Some(slide_clips) = self.render_slides(&ctx, &slides, progress)? else {
            return Ok(None);
        };
        let Some(transition_clips) = self.render_transitions(&ctx, &slide_clips, progress)? else {
            return Ok(None);
        };

        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        self.try_enter(machine, ExportState::Assembling)?;
        let transition_secs =
            f64::from(self.config.transition_spec().frame_count(fps)) / fps.as_f64();
        let segments = timeline(
            &slides,
            slide_clips,
            transition_clips,
            transition_secs,
            &profile_id,
        );
        let output = self.config.output_path();
        let assembled = Assembler::new(self.encoder.as_ref(), &profile, canvas, fps).assemble(
            &segments,
            self.config.soundtrack_path.as_deref(),
            &output,
            &mut |units| progress.advance(Phase::Assembly, units),
        )?;
        for warning in assembled.warnings {
            self.warn(warning);
        }

        self.try_enter(machine, ExportState::Done)?;
        tracing::info!(
            output = %assembled.path.display(),
            duration_secs = assembled.duration_secs,
            "export complete"
        );
        Ok(Some(assembled.path))
    }

    fn discover(&self, progress: &ProgressReporter) -> Flow<Vec<MediaItem>> {
        let items = match &self.input {
            MediaInput::Folder(folder) => {
                let items = discover_media(folder)?;
                estimate_totals(progress, items.len());
                progress.advance(Phase::Discovery, items.len() as u64);
                items
            }
            MediaInput::Files(paths) => {
                estimate_totals(progress, paths.len());
                let mut items = Vec::with_capacity(paths.len());
                for path in paths {
                    if self.cancel.is_cancelled() {
                        return Ok(None);
                    }
                    items.push(MediaItem::from_path(path)?);
                    progress.advance(Phase::Discovery, 1);
                }
                items
            }
        };
        tracing::info!(items = items.len(), "media discovered");
        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        Ok(Some(items))
    }

    fn render_slides(
        &self,
        ctx: &RenderContext<'_>,
        slides: &[Slide],
        progress: &ProgressReporter,
    ) -> Flow<Vec<Artifact>> {
        self.run_units(slides, |slide| {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            let clip =
                render_slide(ctx, slide).map_err(|e| e.in_unit(slide.ordinal, slide.label()))?;
            progress.advance(Phase::SlideRender, 1);
            Ok(Some(clip))
        })
    }

    fn render_transitions(
        &self,
        ctx: &RenderContext<'_>,
        clips: &[Artifact],
        progress: &ProgressReporter,
    ) -> Flow<Vec<Artifact>> {
        let spec = self.config.transition_spec();
        let pairs: Vec<(usize, &Artifact, &Artifact)> = clips
            .windows(2)
            .enumerate()
            .map(|(i, w)| (i, &w[0], &w[1]))
            .collect();
        self.run_units(&pairs, |&(ordinal, from, to)| {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            let clip = render_transition(ctx, &spec, ordinal, from, to)
                .map_err(|e| e.in_unit(ordinal, "transition"))?;
            progress.advance(Phase::TransitionRender, 1);
            Ok(Some(clip))
        })
    }

    /// Run `render` over `units` in order, sequentially or on a rayon pool.
    ///
    /// Stops at the first error. Returns `None` if any unit saw the cancel flag.
    fn run_units<T, F>(&self, units: &[T], render: F) -> Flow<Vec<Artifact>>
    where
        T: Sync,
        F: Fn(&T) -> Flow<Artifact> + Sync + Send,
    {
        let threading = self.config.render_threading;
        let rendered: Vec<Option<Artifact>> = if threading.parallel && units.len() > 1 {
            let pool = build_thread_pool(threading.threads)?;
            pool.install(|| units.par_iter().map(&render).collect::<ReelResult<Vec<_>>>())?
        } else {
            units.iter().map(&render).collect::<ReelResult<Vec<_>>>()?
        };
        Ok(rendered.into_iter().collect())
    }

    fn try_enter(&self, machine: &mut ExportStateMachine, next: ExportState) -> ReelResult<()> {
        machine.advance(next)?;
        tracing::info!(state = %next, "export state");
        self.emit(ExportEvent::State(next));
        Ok(())
    }

    fn enter(&self, machine: &mut ExportStateMachine, next: ExportState) {
        if let Err(e) = self.try_enter(machine, next) {
            tracing::warn!(error = %e, "ignored state change");
        }
    }

    fn warn(&self, message: String) {
        tracing::warn!("{message}");
        self.emit(ExportEvent::Warning(message));
    }

    fn emit(&self, event: ExportEvent) {
        // The caller may have dropped the handle.
        let _ = self.events.send(event);
    }
}

/// Set every phase total from the item count. Later phases are estimates (one slide per item)
/// until sequencing knows the real slide count.
fn estimate_totals(progress: &ProgressReporter, items: usize) {
    let n = items as u64;
    progress.set_total(Phase::Discovery, n);
    progress.set_total(Phase::SlideRender, n);
    progress.set_total(Phase::TransitionRender, n.saturating_sub(1));
    progress.set_total(
        Phase::Assembly,
        Assembler::unit_count((2 * items).saturating_sub(1)),
    );
}

/// Interleave slides and transitions: slide, transition, slide, ...
fn timeline(
    slides: &[Slide],
    slide_clips: Vec<Artifact>,
    transition_clips: Vec<Artifact>,
    transition_secs: f64,
    profile_id: &str,
) -> Vec<Segment> {
    let mut segments = Vec::with_capacity(slide_clips.len() + transition_clips.len());
    let mut transitions = transition_clips.into_iter();
    for (i, (slide, clip)) in slides.iter().zip(slide_clips).enumerate() {
        segments.push(Segment {
            kind: SegmentKind::Slide {
                slide_kind: slide.kind(),
            },
            source: describe(slide.sources()),
            artifact: clip,
            duration_secs: slide.duration_secs,
            profile_id: profile_id.to_owned(),
        });
        if i + 1 < slides.len()
            && let Some(clip) = transitions.next()
        {
            segments.push(Segment {
                kind: SegmentKind::Transition,
                source: format!(
                    "{} -> {}",
                    describe(slide.sources()),
                    describe(slides[i + 1].sources())
                ),
                artifact: clip,
                duration_secs: transition_secs,
                profile_id: profile_id.to_owned(),
            });
        }
    }
    segments
}

fn describe(items: &[MediaItem]) -> String {
    items
        .iter()
        .map(MediaItem::file_name)
        .collect::<Vec<_>>()
        .join(" + ")
}

fn build_thread_pool(threads: Option<usize>) -> ReelResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(ReelError::validation(
            "render threading 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| ReelError::Other(anyhow::anyhow!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/orchestrator.rs"]
mod tests;
