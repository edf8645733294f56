use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use slidereel::{
    CacheStore, EncodingProfile, ExportConfig, ExportEvent, MediaInput, Namespace, Outcome,
};

#[derive(Parser, Debug)]
#[command(name = "slidereel", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export a slideshow video (requires `ffmpeg` and `ffprobe` on PATH).
    Export(ExportArgs),
    /// Inspect or clean the render cache.
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Config JSON. Missing keys take defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Media folder, overriding `input_folder`.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Output MP4 path, overriding `output_folder` and `project_name`.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Render slides and transitions in parallel.
    #[arg(long, default_value_t = false)]
    parallel: bool,

    /// Override rayon worker threads (parallel mode only).
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Print entry counts and disk usage.
    Stats(CacheArgs),
    /// List every entry.
    Entries(CacheArgs),
    /// Delete every entry.
    Clear(CacheArgs),
    /// Delete entries older than a number of days.
    Prune(PruneArgs),
}

#[derive(Parser, Debug)]
struct CacheArgs {
    /// Cache root directory.
    #[arg(long)]
    cache_dir: PathBuf,
}

#[derive(Parser, Debug)]
struct PruneArgs {
    #[command(flatten)]
    cache: CacheArgs,

    /// Minimum entry age in days.
    #[arg(long)]
    older_than_days: u32,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("slidereel=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Export(args) => cmd_export(args),
        Command::Cache(CacheCommand::Stats(args)) => cmd_cache_stats(args),
        Command::Cache(CacheCommand::Entries(args)) => cmd_cache_entries(args),
        Command::Cache(CacheCommand::Clear(args)) => cmd_cache_clear(args),
        Command::Cache(CacheCommand::Prune(args)) => cmd_cache_prune(args),
    }
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => {
            let (config, warning) = ExportConfig::load_or_default(path);
            if let Some(warning) = warning {
                eprintln!("warning: {warning}");
            }
            config
        }
        None => ExportConfig::default(),
    };
    if let Some(input) = args.input {
        config.input_folder = input;
    }
    if let Some(out) = &args.out {
        config.output_folder = out
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        config.project_name = out
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .context("--out must name a file")?;
    }
    config.render_threading.parallel |= args.parallel;
    if args.threads.is_some() {
        config.render_threading.threads = args.threads;
    }

    let input = MediaInput::Folder(config.input_folder.clone());
    let handle = slidereel::export(input, config)?;
    for event in handle.events().iter() {
        match event {
            ExportEvent::State(state) => eprintln!("{state}"),
            ExportEvent::Progress(p) => eprintln!(
                "[{:>5.1}%] {:?} {}/{}",
                p.fraction * 100.0,
                p.phase,
                p.completed,
                p.total
            ),
            ExportEvent::Warning(msg) => eprintln!("warning: {msg}"),
            ExportEvent::Finished(_) => break,
        }
    }

    match handle.wait() {
        Outcome::Success(path) => {
            eprintln!("wrote {}", path.display());
            Ok(())
        }
        Outcome::Cancelled => anyhow::bail!("export cancelled"),
        Outcome::Failure { kind, detail } => anyhow::bail!("export failed ({kind}): {detail}"),
    }
}

fn open_cache(args: &CacheArgs) -> anyhow::Result<CacheStore> {
    let profile = EncodingProfile::preset("standard")?;
    CacheStore::open(&args.cache_dir, Namespace::for_profile(profile.id()))
        .with_context(|| format!("open cache '{}'", args.cache_dir.display()))
}

fn cmd_cache_stats(args: CacheArgs) -> anyhow::Result<()> {
    let stats = open_cache(&args)?.stats()?;
    println!("entries:     {}", stats.entries());
    println!("  clips:     {}", stats.clip_entries);
    println!("  frames:    {}", stats.frame_entries);
    println!("total bytes: {}", stats.total_bytes);
    // Hit/miss counters live in one process; a fresh store has none to report.
    Ok(())
}

fn cmd_cache_entries(args: CacheArgs) -> anyhow::Result<()> {
    for entry in open_cache(&args)?.entries()? {
        println!(
            "{}  {:?}  {:>10}  {}  {}",
            entry.key.to_hex(),
            entry.kind,
            entry.bytes,
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.source
        );
    }
    Ok(())
}

fn cmd_cache_clear(args: CacheArgs) -> anyhow::Result<()> {
    let removed = open_cache(&args)?.clear()?;
    eprintln!("removed {removed} entries");
    Ok(())
}

fn cmd_cache_prune(args: PruneArgs) -> anyhow::Result<()> {
    let removed = open_cache(&args.cache)?
        .remove_older_than(chrono::Duration::days(i64::from(args.older_than_days)))?;
    eprintln!("removed {removed} entries");
    Ok(())
}
