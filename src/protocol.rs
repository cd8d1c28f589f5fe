//! Control-plane messages exchanged between the dispatcher and its workers.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::foundation::core::FrameRange;

/// Arguments a worker needs to render its batch.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WorkerArgs {
    /// Scene to render.
    pub scene: String,
    /// First frame (inclusive).
    pub start_frame: i64,
    /// Last frame (inclusive).
    pub end_frame: i64,
    /// Re-render even when the expected output already exists.
    pub overwrite: bool,
}

impl WorkerArgs {
    /// Frame range carried by these args.
    pub fn range(&self) -> FrameRange {
        FrameRange {
            start: self.start_frame,
            end: self.end_frame,
        }
    }

    /// `true` when the worker must skip rendering because `expected_output` is already on disk.
    ///
    /// A skipping worker still sends its final message and the sentinel.
    pub fn should_skip(&self, expected_output: &Path) -> bool {
        !self.overwrite && expected_output.exists()
    }
}

/// Payload written to a worker's stdin at launch.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Handshake {
    /// `(host, port)` the worker must connect back to.
    pub controller: (String, u16),
    /// Batch arguments.
    pub args: WorkerArgs,
}

impl Handshake {
    /// Build a handshake pointing at `addr`.
    pub fn new(addr: SocketAddr, args: WorkerArgs) -> Self {
        Self {
            controller: (addr.ip().to_string(), addr.port()),
            args,
        }
    }
}

/// Progress report sent by a worker after each finished frame.
///
/// The last message before the sentinel also carries the path of the file the worker wrote.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProgressMessage {
    /// Frame the worker just finished.
    pub current_frame: i64,
    /// Output file, set on the final message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,
}

impl ProgressMessage {
    /// Intermediate progress message.
    pub fn frame(current_frame: i64) -> Self {
        Self {
            current_frame,
            output_file: None,
        }
    }

    /// Final message naming the produced file.
    pub fn finished(current_frame: i64, output_file: impl Into<PathBuf>) -> Self {
        Self {
            current_frame,
            output_file: Some(output_file.into()),
        }
    }
}
