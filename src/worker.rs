//! Worker side of the control protocol.
//!
//! A renderer process launched by the dispatcher reads its [`Handshake`] from stdin, connects back to
//! the controller, reports every finished frame and closes with a final message plus the
//! end-of-stream sentinel. [`WorkerSession`] implements that sequence for renderers hosted in Rust.

use std::io::Read;
use std::net::TcpStream;
use std::path::Path;

use anyhow::Context as _;

use crate::channel::{MessageChannel, read_frame};
use crate::foundation::error::{RenderError, RenderResult};
use crate::protocol::{Handshake, ProgressMessage, WorkerArgs};

/// Connected worker-side session.
#[derive(Debug)]
pub struct WorkerSession {
    channel: MessageChannel<TcpStream>,
    args: WorkerArgs,
    last_frame: i64,
}

impl WorkerSession {
    /// Read the handshake from this process's stdin and connect to the controller.
    pub fn from_stdin() -> RenderResult<Self> {
        Self::from_reader(&mut std::io::stdin().lock())
    }

    /// Read the handshake from `r` and connect to the controller.
    pub fn from_reader(r: &mut dyn Read) -> RenderResult<Self> {
        let handshake: Handshake = read_frame(r)?
            .ok_or_else(|| RenderError::protocol("worker handshake was empty"))?;
        Self::connect(handshake)
    }

    /// Connect to the controller named in `handshake`.
    pub fn connect(handshake: Handshake) -> RenderResult<Self> {
        let (host, port) = &handshake.controller;
        let stream = TcpStream::connect((host.as_str(), *port))
            .with_context(|| format!("connect to controller {host}:{port}"))?;
        Ok(Self {
            channel: MessageChannel::new(stream),
            last_frame: handshake.args.start_frame,
            args: handshake.args,
        })
    }

    /// Batch arguments received in the handshake.
    pub fn args(&self) -> &WorkerArgs {
        &self.args
    }

    /// Report that `frame` has been rendered.
    pub fn report_frame(&mut self, frame: i64) -> RenderResult<()> {
        self.last_frame = frame;
        self.channel.send(&ProgressMessage::frame(frame))
    }

    /// Send the final message (with the output path, if any) followed by the sentinel.
    ///
    /// The session is consumed and the connection closed even when sending fails.
    pub fn finish(mut self, output_file: Option<&Path>) -> RenderResult<()> {
        let last = self.args.end_frame.max(self.last_frame);
        let msg = ProgressMessage {
            current_frame: last,
            output_file: output_file.map(Path::to_path_buf),
        };
        let sent = self.channel.send(&msg);
        let ended = self.channel.send_end();
        sent.and(ended)
    }
}

#[cfg(test)]
#[path = "../tests/unit/worker/worker.rs"]
mod tests;
