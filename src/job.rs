//! Job-level data model and the shared, mutex-guarded job status.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::foundation::core::FrameRange;

/// Exit code recorded when a batch failed inside the supervisor (spawn, handshake, protocol).
pub const SUPERVISOR_FAILURE: i32 = -1;

/// One unit of dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchJob {
    /// Frames to render.
    pub range: FrameRange,
    /// Scene to render.
    pub scene: String,
    /// Re-render even when the batch output already exists.
    pub overwrite: bool,
}

/// Outcome of one [`BatchJob`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchResult {
    /// Frames the batch covered.
    pub range: FrameRange,
    /// Worker exit code. `None` means the batch was never started.
    pub exit_code: Option<i32>,
    /// File written by the worker, as reported in its final message.
    pub output_file: Option<PathBuf>,
}

impl BatchResult {
    /// Result for a batch that failed before its worker produced an exit code.
    pub fn supervisor_failure(range: FrameRange) -> Self {
        Self {
            range,
            exit_code: Some(SUPERVISOR_FAILURE),
            output_file: None,
        }
    }

    /// Result for a batch that was not started because the job stopped running.
    pub fn skipped(range: FrameRange) -> Self {
        Self {
            range,
            exit_code: None,
            output_file: None,
        }
    }

    /// `true` only for a worker that exited with code 0.
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// `true` when the worker ran and did not exit cleanly.
    pub fn failed(&self) -> bool {
        matches!(self.exit_code, Some(code) if code != 0)
    }
}

/// Lifecycle state of a job run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Batches are rendering, or the job is between pipeline stages.
    Running,
    /// Exporting the audio track.
    Mixdown,
    /// Joining batch outputs into the final file.
    Concatenate,
    /// Deleting intermediate files.
    Cleaning,
    /// Cancellation was requested; no further stages start.
    Cancelling,
    /// A batch or a pipeline stage failed.
    Failed,
    /// All requested stages finished.
    Done,
}

impl JobState {
    fn action(self) -> &'static str {
        match self {
            Self::Running => "Completed",
            Self::Mixdown => "Mixdown",
            Self::Concatenate => "Concatenating",
            Self::Cleaning => "Cleaning",
            Self::Cancelling => "Cancelling",
            Self::Failed => "Failed",
            Self::Done => "Done",
        }
    }
}

/// Terminal tri-state outcome for observers polling a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run has not finished yet.
    Pending,
    /// The run finished in [`JobState::Done`].
    Done,
    /// The run finished failed or cancelled.
    Failed,
}

/// Progress counters for one job run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JobSummary {
    /// Number of batches in the job.
    pub total_batches: u64,
    /// Batches that produced a result.
    pub batches_done: u64,
    /// Frames spanned by the job.
    pub total_frames: u64,
    /// Frames reported finished by workers.
    pub frames_done: u64,
}

impl JobSummary {
    /// Finished frames as a percentage of the job.
    pub fn percent(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        100.0 * self.frames_done as f64 / self.total_frames as f64
    }
}

/// Snapshot of a job's state and counters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JobStatus {
    /// Current state.
    pub state: JobState,
    /// Current counters.
    pub summary: JobSummary,
    /// Set once the dispatcher has returned.
    pub finished: bool,
}

impl JobStatus {
    /// Human readable progress line, e.g. `Completed Batches: 1/3 Frames: 11/30 [36.7%]`.
    pub fn progress_line(&self) -> String {
        format!(
            "{} Batches: {}/{} Frames: {}/{} [{:.1}%]",
            self.state.action(),
            self.summary.batches_done,
            self.summary.total_batches,
            self.summary.frames_done,
            self.summary.total_frames,
            self.summary.percent()
        )
    }

    /// Tri-state outcome.
    pub fn outcome(&self) -> RunOutcome {
        match (self.finished, self.state) {
            (false, _) => RunOutcome::Pending,
            (true, JobState::Done) => RunOutcome::Done,
            (true, _) => RunOutcome::Failed,
        }
    }
}

#[derive(Debug)]
struct JobShared {
    status: Mutex<JobStatus>,
    cancel_requested: AtomicBool,
}

/// Cloneable handle to the one mutex-guarded state + summary pair of a job run.
///
/// The dispatcher, every supervisor and any observer share the same handle. All counter updates go
/// through the single mutex, so they are atomic and monotonic.
#[derive(Clone, Debug)]
pub struct JobHandle {
    inner: Arc<JobShared>,
}

impl Default for JobHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl JobHandle {
    /// Fresh handle in [`JobState::Running`] with zeroed counters.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(JobShared {
                status: Mutex::new(JobStatus {
                    state: JobState::Running,
                    summary: JobSummary::default(),
                    finished: false,
                }),
                cancel_requested: AtomicBool::new(false),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JobStatus> {
        // Counters stay consistent even if a holder panicked; keep serving them.
        self.inner
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state and counters.
    pub fn status(&self) -> JobStatus {
        *self.lock()
    }

    /// Current state.
    pub fn state(&self) -> JobState {
        self.lock().state
    }

    /// Tri-state outcome for polling observers.
    pub fn outcome(&self) -> RunOutcome {
        self.status().outcome()
    }

    /// Request cooperative cancellation.
    ///
    /// In-flight batches keep running; the dispatcher stops starting batches and pipeline stages at
    /// its next checkpoint.
    pub fn cancel(&self) {
        self.inner.cancel_requested.store(true, Ordering::SeqCst);
        let mut status = self.lock();
        if status.state == JobState::Running {
            status.state = JobState::Cancelling;
        }
    }

    /// `true` once [`JobHandle::cancel`] has been called.
    pub fn is_cancel_requested(&self) -> bool {
        self.inner.cancel_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn begin(&self, total_batches: u64, total_frames: u64) {
        let mut status = self.lock();
        status.summary = JobSummary {
            total_batches,
            batches_done: 0,
            total_frames,
            frames_done: 0,
        };
        status.finished = false;
        if !self.is_cancel_requested() {
            status.state = JobState::Running;
        }
    }

    /// Credit `frames` finished frames, never past the job total.
    pub(crate) fn add_frames(&self, frames: u64) {
        let mut status = self.lock();
        let s = &mut status.summary;
        s.frames_done = s.frames_done.saturating_add(frames).min(s.total_frames);
    }

    /// Record one collected batch result. A failing result moves a running job to `Failed`.
    pub(crate) fn record_batch(&self, result: &BatchResult) -> JobStatus {
        let mut status = self.lock();
        let s = &mut status.summary;
        s.batches_done = (s.batches_done + 1).min(s.total_batches);
        if result.failed() && status.state == JobState::Running {
            status.state = JobState::Failed;
        }
        *status
    }

    /// Cancellation checkpoint. Returns `true` when the job may continue in `Running`.
    pub(crate) fn checkpoint(&self) -> bool {
        let cancel = self.is_cancel_requested();
        let mut status = self.lock();
        if cancel && status.state == JobState::Running {
            status.state = JobState::Cancelling;
        }
        status.state == JobState::Running
    }

    /// Enter a pipeline stage if the job is still running.
    pub(crate) fn enter_stage(&self, stage: JobState) -> bool {
        if !self.checkpoint() {
            return false;
        }
        self.lock().state = stage;
        true
    }

    /// Leave a pipeline stage, back to `Running` on success or to `Failed`.
    pub(crate) fn leave_stage(&self, stage: JobState, ok: bool) {
        let mut status = self.lock();
        if status.state == stage {
            status.state = if ok {
                JobState::Running
            } else {
                JobState::Failed
            };
        }
    }

    /// Force the failed state, unless the job is already terminal.
    pub(crate) fn fail(&self) {
        let mut status = self.lock();
        if !matches!(status.state, JobState::Done | JobState::Cancelling) {
            status.state = JobState::Failed;
        }
    }

    /// Mark the run as returned; a still-running job becomes `Done` unless cancellation arrived.
    pub(crate) fn finish(&self) -> JobStatus {
        let cancel = self.is_cancel_requested();
        let mut status = self.lock();
        if status.state == JobState::Running {
            status.state = if cancel {
                JobState::Cancelling
            } else {
                JobState::Done
            };
        }
        status.finished = true;
        *status
    }
}

#[cfg(test)]
#[path = "../tests/unit/job/job.rs"]
mod tests;
