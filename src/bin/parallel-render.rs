use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(name = "parallel-render", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a job described by a JSON file.
    Render(RenderArgs),
    /// Print the batches a frame interval is split into.
    Ranges(RangesArgs),
    /// Check whether a concatenation tool (ffmpeg) is usable.
    CheckTool(CheckToolArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Job JSON.
    #[arg(long)]
    job: PathBuf,

    /// Override the maximum number of concurrent workers.
    #[arg(long)]
    max_parallel: Option<usize>,

    /// Re-render existing batch outputs and replace the final file.
    #[arg(long)]
    overwrite: bool,

    /// Render from a temporary copy of the project.
    #[arg(long)]
    snapshot: bool,

    /// Skip the audio mixdown.
    #[arg(long)]
    no_mixdown: bool,

    /// Keep batch outputs separate.
    #[arg(long)]
    no_concatenate: bool,

    /// Keep intermediate files after concatenation.
    #[arg(long)]
    no_cleanup: bool,
}

#[derive(Parser, Debug)]
struct RangesArgs {
    /// First frame (inclusive).
    #[arg(long, allow_hyphen_values = true)]
    start: i64,

    /// Last frame (inclusive).
    #[arg(long, allow_hyphen_values = true)]
    end: i64,

    #[command(flatten)]
    policy: PolicyArgs,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct PolicyArgs {
    /// Batches of this many frames (plus one).
    #[arg(long)]
    fixed: Option<u32>,

    /// Split into this many batches.
    #[arg(long)]
    parts: Option<u32>,
}

#[derive(Parser, Debug)]
struct CheckToolArgs {
    /// Path to the executable.
    #[arg(long)]
    path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Ranges(args) => cmd_ranges(args),
        Command::CheckTool(args) => cmd_check_tool(args),
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut cfg = parallel_render::JobConfig::from_path(&args.job)
        .with_context(|| format!("load job '{}'", args.job.display()))?;
    if let Some(n) = args.max_parallel {
        cfg.max_parallel = n;
    }
    cfg.overwrite |= args.overwrite;
    cfg.snapshot |= args.snapshot;
    cfg.mixdown &= !args.no_mixdown;
    cfg.concatenate &= !args.no_concatenate;
    cfg.cleanup &= !args.no_cleanup;
    cfg.validate()?;

    let handle = parallel_render::JobHandle::new();
    // Ctrl-C cancels cooperatively; the snapshot is removed when the dispatcher returns.
    let canceller = handle.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupt received; cancelling");
        canceller.cancel();
    })
    .context("install interrupt handler")?;
    let report = std::thread::scope(|scope| {
        let run = scope.spawn(|| parallel_render::Dispatcher::new(&cfg).run(&handle));
        let mut last = String::new();
        while !run.is_finished() {
            let line = handle.status().progress_line();
            if line != last {
                eprintln!("{line}");
                last = line;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        run.join()
            .map_err(|_| anyhow::anyhow!("dispatcher thread panicked"))
    })??;

    eprintln!("{}", report.status.progress_line());
    if let Some(out) = &report.final_output {
        eprintln!("wrote {}", out.display());
    }
    match report.status.outcome() {
        parallel_render::RunOutcome::Done => Ok(()),
        _ => anyhow::bail!("render did not complete ({:?})", report.status.state),
    }
}

fn cmd_ranges(args: RangesArgs) -> anyhow::Result<()> {
    let interval = parallel_render::FrameRange::new(args.start, args.end)?;
    let policy = match (args.policy.fixed, args.policy.parts) {
        (Some(increment), _) => parallel_render::BatchPolicy::Fixed { increment },
        (None, Some(parts)) => parallel_render::BatchPolicy::Parts { parts },
        (None, None) => anyhow::bail!("one of --fixed or --parts is required"),
    };
    let ranges = policy.partition(interval)?;
    for r in &ranges {
        println!("{} {}", r.start, r.end);
    }
    eprintln!(
        "{} batches, {} frames",
        ranges.len(),
        parallel_render::total_frames(&ranges)
    );
    Ok(())
}

fn cmd_check_tool(args: CheckToolArgs) -> anyhow::Result<()> {
    let status = parallel_render::validate_tool(Some(&args.path));
    println!("{}: {}", args.path.display(), status.describe());
    if !status.is_valid() {
        anyhow::bail!("tool '{}' is not usable", args.path.display());
    }
    Ok(())
}
