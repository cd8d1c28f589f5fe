//! Job state machine: partition, run batches on a bounded pool, then post-process.

use std::path::{Path, PathBuf};
use std::sync::mpsc;

use rayon::prelude::*;

use crate::config::JobConfig;
use crate::foundation::core::FrameRange;
use crate::foundation::error::{RenderError, RenderResult};
use crate::job::{BatchJob, BatchResult, JobHandle, JobState, JobStatus};
use crate::output::{TempFileGuard, range_output_path, temp_path};
use crate::partition::total_frames;
use crate::post::{
    AudioMixdown, ConcatRequest, ConcatTool, RendererMixdown, remove_files, write_playlist,
};
use crate::snapshot::ProjectSnapshot;
use crate::supervisor::{ProcessLauncher, RendererLauncher, Supervisor};

/// Everything a finished run produced.
#[derive(Clone, Debug, PartialEq)]
pub struct JobReport {
    /// Final state and counters.
    pub status: JobStatus,
    /// One result per batch, ordered by range start.
    pub results: Vec<BatchResult>,
    /// Mixed audio file, unless cleanup removed it or no mixdown ran.
    pub mixdown_output: Option<PathBuf>,
    /// Concatenated file, when concatenation succeeded.
    pub final_output: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct PostOutputs {
    mixdown: Option<PathBuf>,
    concatenated: Option<PathBuf>,
}

/// Drives one [`JobConfig`] through the job state machine.
///
/// By default workers are launched with [`RendererLauncher`] and audio is exported with
/// [`RendererMixdown`], both pointed at the project snapshot. Either can be replaced.
pub struct Dispatcher<'a> {
    config: &'a JobConfig,
    launcher: Option<&'a dyn ProcessLauncher>,
    mixdown: Option<&'a dyn AudioMixdown>,
}

impl<'a> Dispatcher<'a> {
    /// Dispatcher for `config` using the renderer-backed launcher and mixdown.
    pub fn new(config: &'a JobConfig) -> Self {
        Self {
            config,
            launcher: None,
            mixdown: None,
        }
    }

    /// Launch workers with `launcher` instead of the renderer.
    pub fn with_launcher(mut self, launcher: &'a dyn ProcessLauncher) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Export audio with `mixdown` instead of the renderer.
    pub fn with_mixdown(mut self, mixdown: &'a dyn AudioMixdown) -> Self {
        self.mixdown = Some(mixdown);
        self
    }

    /// Run the job to completion, publishing state and progress through `handle`.
    ///
    /// Batch failures are reported through the returned status; errors are reserved for invalid
    /// jobs and failing pipeline stages. `handle` is marked finished on every path.
    #[tracing::instrument(skip_all, fields(scene = %self.config.scene))]
    pub fn run(&self, handle: &JobHandle) -> RenderResult<JobReport> {
        let run = self.try_run(handle);
        if run.is_err() {
            handle.fail();
        }
        let status = handle.finish();
        match &run {
            Ok(_) if status.state == JobState::Done => {
                tracing::info!("{}", status.progress_line())
            }
            Ok(_) => tracing::warn!("{}", status.progress_line()),
            Err(e) => tracing::error!(error = %e, "{}", status.progress_line()),
        }
        let (results, post) = run?;
        Ok(JobReport {
            status,
            results,
            mixdown_output: post.mixdown,
            final_output: post.concatenated,
        })
    }

    fn try_run(&self, handle: &JobHandle) -> RenderResult<(Vec<BatchResult>, PostOutputs)> {
        let cfg = self.config;
        cfg.validate()?;
        let interval = cfg.interval()?;
        let ranges = cfg.batch.partition(interval)?;
        // Dropped last, after every stage that may read the project.
        let snapshot = ProjectSnapshot::prepare(&cfg.project, cfg.snapshot)?;

        let renderer_launcher;
        let launcher: &dyn ProcessLauncher = match self.launcher {
            Some(l) => l,
            None => {
                renderer_launcher = RendererLauncher {
                    renderer: cfg.renderer.clone(),
                    project: snapshot.path().to_path_buf(),
                    script: cfg.worker_script.clone(),
                };
                &renderer_launcher
            }
        };

        let jobs: Vec<BatchJob> = ranges
            .iter()
            .map(|&range| BatchJob {
                range,
                scene: cfg.scene.clone(),
                overwrite: cfg.overwrite,
            })
            .collect();
        handle.begin(jobs.len() as u64, total_frames(&ranges));
        tracing::info!(
            batches = jobs.len(),
            frames = total_frames(&ranges),
            max_parallel = cfg.max_parallel,
            snapshot = snapshot.is_temporary(),
            "starting render"
        );

        let mut results = self.render_batches(launcher, &jobs, handle)?;
        results.sort_by_key(|r| r.range.start);
        self.discard_partial_outputs(&results);

        let post = self.post_process(snapshot.path(), interval, &results, handle)?;
        drop(snapshot);
        Ok((results, post))
    }

    fn render_batches(
        &self,
        launcher: &dyn ProcessLauncher,
        jobs: &[BatchJob],
        handle: &JobHandle,
    ) -> RenderResult<Vec<BatchResult>> {
        let pool = build_thread_pool(self.config.max_parallel)?;
        let supervisor =
            Supervisor::new(launcher).with_handshake_timeout(self.config.handshake_timeout());
        let (tx, rx) = mpsc::channel::<BatchResult>();

        let mut results = Vec::with_capacity(jobs.len());
        std::thread::scope(|scope| {
            let supervisor = &supervisor;
            scope.spawn(move || {
                pool.install(|| {
                    jobs.par_iter()
                        .with_max_len(1)
                        .for_each_with(tx, |tx, job| {
                            let result = if handle.checkpoint() {
                                supervisor.run(job, handle)
                            } else {
                                tracing::debug!(range = %job.range, "job stopped; batch skipped");
                                BatchResult::skipped(job.range)
                            };
                            // The receiver outlives every sender.
                            let _ = tx.send(result);
                        });
                });
            });

            for result in rx {
                let status = handle.record_batch(&result);
                if result.failed() {
                    tracing::error!(
                        range = %result.range,
                        exit_code = ?result.exit_code,
                        "batch failed"
                    );
                }
                match status.state {
                    JobState::Running => tracing::info!("{}", status.progress_line()),
                    JobState::Failed => tracing::error!("{}", status.progress_line()),
                    _ => tracing::warn!("{}", status.progress_line()),
                }
                handle.checkpoint();
                results.push(result);
            }
        });
        Ok(results)
    }

    /// Remove the files failed batches reported; they are partial renders.
    ///
    /// A failed batch that never reported a file leaves the disk alone, so an output kept from an
    /// earlier run survives.
    fn discard_partial_outputs(&self, results: &[BatchResult]) {
        let partial: Vec<PathBuf> = results
            .iter()
            .filter(|r| r.failed())
            .filter_map(|r| r.output_file.clone())
            .collect();
        let removed = remove_files(partial.iter().map(PathBuf::as_path));
        if removed > 0 {
            tracing::warn!(removed, "removed partial outputs of failed batches");
        }
    }

    fn post_process(
        &self,
        project: &Path,
        interval: FrameRange,
        results: &[BatchResult],
        handle: &JobHandle,
    ) -> RenderResult<PostOutputs> {
        let cfg = self.config;
        let mut out = PostOutputs::default();

        if cfg.mixdown && handle.enter_stage(JobState::Mixdown) {
            let audio = range_output_path(&cfg.output_prefix, interval, &cfg.mixdown_ext);
            let mixed = self.mixdown(project, interval, &audio);
            handle.leave_stage(JobState::Mixdown, mixed.is_ok());
            mixed?;
            tracing::info!(audio = %audio.display(), "mixdown finished");
            out.mixdown = Some(audio);
        }

        let mut playlist = TempFileGuard::default();
        if cfg.concatenate
            && let Some(tool) = self.concat_tool()
            && handle.enter_stage(JobState::Concatenate)
        {
            let output = range_output_path(&cfg.output_prefix, interval, &cfg.container);
            let joined = self.concatenate(
                &tool,
                results,
                out.mixdown.as_deref(),
                &output,
                &mut playlist,
            );
            let ok = matches!(joined, Ok(true));
            handle.leave_stage(JobState::Concatenate, ok);
            if joined? {
                tracing::info!(output = %output.display(), "concatenation finished");
                out.concatenated = Some(output);
            }
        }

        if cfg.cleanup
            && let Some(output) = out.concatenated.as_deref()
            && handle.enter_stage(JobState::Cleaning)
        {
            let mut doomed: Vec<PathBuf> = results
                .iter()
                .filter_map(|r| r.output_file.clone())
                .collect();
            doomed.extend(playlist.0.clone());
            doomed.extend(out.mixdown.take());
            doomed.retain(|p| !same_file(p, output));
            let removed = remove_files(doomed.iter().map(PathBuf::as_path));
            tracing::info!(removed, "cleanup finished");
            handle.leave_stage(JobState::Cleaning, true);
        }

        Ok(out)
    }

    fn mixdown(&self, project: &Path, interval: FrameRange, audio: &Path) -> RenderResult<()> {
        if let Some(m) = self.mixdown {
            return m.mixdown(interval, audio);
        }
        let script = self.config.mixdown_script.clone().ok_or_else(|| {
            RenderError::validation("mixdown requires mixdown_script to be set")
        })?;
        RendererMixdown {
            renderer: self.config.renderer.clone(),
            project: project.to_path_buf(),
            script,
        }
        .mixdown(interval, audio)
    }

    /// Configured tool, or `None` when it is unusable and concatenation is skipped for this run.
    fn concat_tool(&self) -> Option<ConcatTool> {
        let path = self.config.concat_tool.clone().unwrap_or_default();
        match ConcatTool::new(&path) {
            Ok(tool) => Some(tool),
            Err(status) => {
                tracing::warn!(
                    tool = %path.display(),
                    reason = status.describe(),
                    "concatenation tool unusable; skipping concatenation and cleanup"
                );
                None
            }
        }
    }

    /// Returns `Ok(true)` when `output` holds the joined batches.
    fn concatenate(
        &self,
        tool: &ConcatTool,
        results: &[BatchResult],
        audio: Option<&Path>,
        output: &Path,
        playlist: &mut TempFileGuard,
    ) -> RenderResult<bool> {
        let parts: Vec<&Path> = results
            .iter()
            .filter(|r| r.succeeded())
            .filter_map(|r| r.output_file.as_deref())
            .collect();
        if audio.is_none() && parts.len() == 1 && same_file(parts[0], output) {
            tracing::info!(output = %output.display(), "single batch already is the final output");
            return Ok(true);
        }

        let path = temp_path("concat", "txt");
        playlist.0 = Some(path.clone());
        write_playlist(&path, results)?;
        let code = tool.run(&ConcatRequest {
            playlist: &path,
            audio,
            output,
            overwrite: self.config.overwrite,
        })?;
        Ok(code == 0)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (std::path::absolute(a), std::path::absolute(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn build_thread_pool(threads: usize) -> RenderResult<rayon::ThreadPool> {
    if threads == 0 {
        return Err(RenderError::validation("max_parallel must be >= 1"));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("render-batch-{i}"))
        .build()
        .map_err(|e| RenderError::worker(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../tests/unit/dispatch/dispatch.rs"]
mod tests;
