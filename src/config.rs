//! JSON job description.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::foundation::core::FrameRange;
use crate::foundation::error::{RenderError, RenderResult};
use crate::partition::BatchPolicy;

/// Everything needed to run one parallel render job.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    /// Renderer executable.
    pub renderer: PathBuf,
    /// Project file to render.
    pub project: PathBuf,
    /// Script the renderer runs in each worker.
    pub worker_script: PathBuf,
    /// Script the renderer runs to export the audio mixdown.
    #[serde(default)]
    pub mixdown_script: Option<PathBuf>,
    /// Scene to render.
    pub scene: String,
    /// First frame of the job (inclusive).
    pub frame_start: i64,
    /// Last frame of the job (inclusive).
    pub frame_end: i64,
    /// Batching strategy.
    pub batch: BatchPolicy,
    /// Maximum number of concurrent workers.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Re-render batches and replace the final output when they already exist.
    #[serde(default)]
    pub overwrite: bool,
    /// Export the audio track after rendering.
    #[serde(default)]
    pub mixdown: bool,
    /// Join batch outputs into one file.
    #[serde(default)]
    pub concatenate: bool,
    /// Delete batch outputs and intermediates after a successful concatenation.
    #[serde(default)]
    pub cleanup: bool,
    /// Concatenation executable (`ffmpeg`).
    #[serde(default)]
    pub concat_tool: Option<PathBuf>,
    /// Output path prefix, e.g. `output/test` for `output/test0001-0030.mp4`.
    pub output_prefix: PathBuf,
    /// Container extension of batch outputs and the final file.
    #[serde(default = "default_container")]
    pub container: String,
    /// Extension of the mixdown audio file.
    #[serde(default = "default_mixdown_ext")]
    pub mixdown_ext: String,
    /// Seconds to wait for a worker to connect back.
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    /// Render from a temporary copy of the project instead of the file itself.
    #[serde(default)]
    pub snapshot: bool,
}

fn default_max_parallel() -> usize {
    std::thread::available_parallelism()
        .map(|n| (n.get() / 2).max(1))
        .unwrap_or(1)
}

fn default_container() -> String {
    "mp4".to_string()
}

fn default_mixdown_ext() -> String {
    "mp3".to_string()
}

fn default_handshake_timeout_secs() -> u64 {
    30
}

impl JobConfig {
    /// Load a job from a JSON file. Relative paths stay relative to the working directory.
    pub fn from_path(path: impl AsRef<Path>) -> RenderResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            RenderError::validation(format!("open job JSON '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Parse and validate a job from JSON.
    pub fn from_reader(r: impl Read) -> RenderResult<Self> {
        let cfg: Self = serde_json::from_reader(r)
            .map_err(|e| RenderError::serde(format!("parse job JSON: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> RenderResult<()> {
        self.interval()?;
        match self.batch {
            BatchPolicy::Fixed { increment: 0 } => {
                return Err(RenderError::validation(
                    "batch.fixed.increment must be >= 1",
                ));
            }
            BatchPolicy::Parts { parts: 0 } => {
                return Err(RenderError::validation("batch.parts.parts must be >= 1"));
            }
            _ => {}
        }
        if self.max_parallel == 0 {
            return Err(RenderError::validation("max_parallel must be >= 1"));
        }
        if self.handshake_timeout_secs == 0 {
            return Err(RenderError::validation(
                "handshake_timeout_secs must be >= 1",
            ));
        }
        if self.mixdown && self.mixdown_script.is_none() {
            return Err(RenderError::validation(
                "mixdown requires mixdown_script to be set",
            ));
        }
        if self.scene.is_empty() {
            return Err(RenderError::validation("scene must not be empty"));
        }
        Ok(())
    }

    /// Job interval.
    pub fn interval(&self) -> RenderResult<FrameRange> {
        FrameRange::new(self.frame_start, self.frame_end)
    }

    /// Handshake timeout as a [`Duration`].
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

#[cfg(test)]
#[path = "../tests/unit/config/config.rs"]
mod tests;
