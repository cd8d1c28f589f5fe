//! Parallel frame-range rendering orchestrator.
//!
//! A job's frame interval is split into batches, each batch is rendered by its own external
//! renderer process, and the per-batch movie files are optionally joined into one output:
//!
//! - Describe the job with a [`JobConfig`]
//! - Run it with a [`Dispatcher`], observing progress through a shared [`JobHandle`]
//! - Renderer-side scripts hosted in Rust talk back through [`WorkerSession`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Wire framing of the control channel.
pub mod channel;
/// JSON job description.
pub mod config;
/// Job state machine.
pub mod dispatch;
/// Batch, result and shared job status types.
pub mod job;
/// Output file naming.
pub mod output;
/// Frame interval partitioning.
pub mod partition;
/// Mixdown, concatenation and cleanup.
pub mod post;
/// Control-plane messages.
pub mod protocol;
/// Project file snapshot.
pub mod snapshot;
/// Per-batch worker supervision.
pub mod supervisor;
/// Worker side of the control protocol.
pub mod worker;

pub use crate::foundation::core::FrameRange;
pub use crate::foundation::error::{RenderError, RenderResult};

pub use crate::channel::{MessageChannel, read_frame, write_frame};
pub use crate::config::JobConfig;
pub use crate::dispatch::{Dispatcher, JobReport};
pub use crate::job::{
    BatchJob, BatchResult, JobHandle, JobState, JobStatus, JobSummary, RunOutcome,
};
pub use crate::partition::{BatchPolicy, total_frames};
pub use crate::post::{AudioMixdown, ConcatTool, RendererMixdown, ToolStatus, validate_tool};
pub use crate::protocol::{Handshake, ProgressMessage, WorkerArgs};
pub use crate::snapshot::ProjectSnapshot;
pub use crate::supervisor::{
    ControlListener, LoopbackListener, ProcessLauncher, RendererLauncher, Supervisor,
    WorkerProcess,
};
pub use crate::worker::WorkerSession;
