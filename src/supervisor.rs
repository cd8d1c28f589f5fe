//! Lifecycle of one worker process: spawn, handshake, progress loop, exit code.
//!
//! Everything that can go wrong for a single batch is caught here and turned into a
//! [`BatchResult`]; nothing escapes to the dispatcher as an error.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use anyhow::Context as _;

use crate::channel::{MessageChannel, write_frame};
use crate::foundation::error::{RenderError, RenderResult};
use crate::job::{BatchJob, BatchResult, JobHandle};
use crate::protocol::{Handshake, ProgressMessage, WorkerArgs};

/// Default bound on waiting for a worker to connect back.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

const ACCEPT_POLL: Duration = Duration::from_millis(10);
const EXIT_CHECK: Duration = Duration::from_millis(100);

/// A running worker process.
pub trait WorkerProcess: Send {
    /// Block until the process exits and return its exit code.
    fn wait(&mut self) -> RenderResult<i32>;
    /// Exit code if the process has already exited, without blocking.
    fn try_wait(&mut self) -> RenderResult<Option<i32>>;
    /// Terminate a worker that never connected.
    fn kill(&mut self) -> RenderResult<()>;
}

/// Capability to start worker processes.
pub trait ProcessLauncher: Send + Sync {
    /// Start a worker for `job`, delivering `handshake` on its stdin before returning.
    fn launch(&self, job: &BatchJob, handshake: &Handshake)
    -> RenderResult<Box<dyn WorkerProcess>>;
}

/// Capability to accept the single inbound control connection of a worker.
pub trait ControlListener {
    /// Address handed to the worker in its handshake.
    fn local_addr(&self) -> RenderResult<SocketAddr>;
    /// Accept one connection, or `None` once `timeout` has passed without one.
    fn accept_timeout(&self, timeout: Duration) -> RenderResult<Option<TcpStream>>;
}

/// Ephemeral listener on the loopback interface.
#[derive(Debug)]
pub struct LoopbackListener {
    listener: TcpListener,
}

impl LoopbackListener {
    /// Bind an ephemeral loopback port.
    pub fn bind() -> RenderResult<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .context("bind loopback control socket")?;
        Ok(Self { listener })
    }
}

impl ControlListener for LoopbackListener {
    fn local_addr(&self) -> RenderResult<SocketAddr> {
        Ok(self
            .listener
            .local_addr()
            .context("query control socket address")?)
    }

    fn accept_timeout(&self, timeout: Duration) -> RenderResult<Option<TcpStream>> {
        // std has no accept timeout; poll a non-blocking listener until the deadline.
        self.listener
            .set_nonblocking(true)
            .context("make control socket non-blocking")?;
        let deadline = Instant::now() + timeout;
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "worker connected");
                    stream
                        .set_nonblocking(false)
                        .context("make control connection blocking")?;
                    return Ok(Some(stream));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    std::thread::sleep(ACCEPT_POLL);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(RenderError::worker(format!(
                        "accept worker connection: {e}"
                    )));
                }
            }
        }
    }
}

/// Launches `renderer <project> --background --python <script>` per batch.
#[derive(Clone, Debug)]
pub struct RendererLauncher {
    /// Renderer executable.
    pub renderer: PathBuf,
    /// Project file every worker opens.
    pub project: PathBuf,
    /// Script the renderer runs to act as a worker.
    pub script: PathBuf,
}

impl RendererLauncher {
    /// Command line for one worker, without stdio configuration.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.renderer);
        cmd.arg(&self.project)
            .arg("--background")
            .arg("--python")
            .arg(&self.script);
        cmd
    }
}

impl ProcessLauncher for RendererLauncher {
    fn launch(
        &self,
        job: &BatchJob,
        handshake: &Handshake,
    ) -> RenderResult<Box<dyn WorkerProcess>> {
        let mut cmd = self.command();
        cmd.stdin(Stdio::piped());
        let mut child = cmd.spawn().map_err(|e| {
            RenderError::worker(format!(
                "failed to spawn renderer '{}' for {}: {e}",
                self.renderer.display(),
                job.range
            ))
        })?;

        // Dropping stdin after the handshake closes it, so the worker sees EOF.
        let delivered = match child.stdin.take() {
            Some(mut stdin) => write_frame(&mut stdin, Some(handshake)),
            None => Err(RenderError::worker(
                "failed to open renderer stdin (unexpected)",
            )),
        };
        let mut process = ChildProcess(Some(child));
        if let Err(e) = delivered {
            process.kill()?;
            return Err(e);
        }
        Ok(Box::new(process))
    }
}

/// [`WorkerProcess`] backed by a real child process.
#[derive(Debug)]
pub struct ChildProcess(Option<Child>);

impl WorkerProcess for ChildProcess {
    fn wait(&mut self) -> RenderResult<i32> {
        let child = self
            .0
            .as_mut()
            .ok_or_else(|| RenderError::worker("worker process already reaped"))?;
        let status = child
            .wait()
            .map_err(|e| RenderError::worker(format!("failed to wait for worker: {e}")))?;
        Ok(exit_code(status))
    }

    fn try_wait(&mut self) -> RenderResult<Option<i32>> {
        let child = self
            .0
            .as_mut()
            .ok_or_else(|| RenderError::worker("worker process already reaped"))?;
        let status = child
            .try_wait()
            .map_err(|e| RenderError::worker(format!("failed to poll worker: {e}")))?;
        Ok(status.map(exit_code))
    }

    fn kill(&mut self) -> RenderResult<()> {
        if let Some(child) = self.0.as_mut() {
            // The process may already be gone; reaping is what matters.
            let _ = child.kill();
            let _ = child.wait();
        }
        Ok(())
    }
}

/// Exit code of `status`; on unix a signal death maps to the negated signal number.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt as _;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    crate::job::SUPERVISOR_FAILURE
}

/// Runs batches to completion, one worker process each.
pub struct Supervisor<'a> {
    launcher: &'a dyn ProcessLauncher,
    handshake_timeout: Duration,
}

impl<'a> Supervisor<'a> {
    /// Supervisor using `launcher` and the default handshake timeout.
    pub fn new(launcher: &'a dyn ProcessLauncher) -> Self {
        Self {
            launcher,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Override the handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Run `job` on a fresh loopback listener. Never fails: errors become a failed result.
    pub fn run(&self, job: &BatchJob, handle: &JobHandle) -> BatchResult {
        match LoopbackListener::bind() {
            Ok(listener) => self.run_with_listener(&listener, job, handle),
            Err(e) => {
                tracing::error!(range = %job.range, error = %e, "batch failed before launch");
                BatchResult::supervisor_failure(job.range)
            }
        }
    }

    /// Run `job` accepting its control connection on `listener`.
    #[tracing::instrument(skip_all, fields(range = %job.range))]
    pub fn run_with_listener(
        &self,
        listener: &dyn ControlListener,
        job: &BatchJob,
        handle: &JobHandle,
    ) -> BatchResult {
        match self.try_run(listener, job, handle) {
            Ok(result) => {
                tracing::info!(exit_code = ?result.exit_code, "worker exited");
                result
            }
            Err(e) => {
                tracing::error!(error = %e, "batch failed");
                BatchResult::supervisor_failure(job.range)
            }
        }
    }

    fn try_run(
        &self,
        listener: &dyn ControlListener,
        job: &BatchJob,
        handle: &JobHandle,
    ) -> RenderResult<BatchResult> {
        let handshake = Handshake::new(
            listener.local_addr()?,
            WorkerArgs {
                scene: job.scene.clone(),
                start_frame: job.range.start,
                end_frame: job.range.end,
                overwrite: job.overwrite,
            },
        );
        let mut process = self.launcher.launch(job, &handshake)?;

        let stream = match self.await_connection(listener, process.as_mut()) {
            Ok(stream) => stream,
            Err(e) => {
                // Never connected, so nothing will ever make it exit on its own terms.
                process.kill()?;
                return Err(e);
            }
        };

        let exchanged = collect_progress(MessageChannel::new(stream), job, handle);
        let exit_code = process.wait()?;
        let output_file = exchanged?;
        Ok(BatchResult {
            range: job.range,
            exit_code: Some(exit_code),
            output_file,
        })
    }

    /// Wait for the worker to connect, giving up at the handshake timeout or as soon as the worker
    /// has exited without connecting.
    fn await_connection(
        &self,
        listener: &dyn ControlListener,
        process: &mut dyn WorkerProcess,
    ) -> RenderResult<TcpStream> {
        let deadline = Instant::now() + self.handshake_timeout;
        loop {
            let slice = deadline
                .saturating_duration_since(Instant::now())
                .min(EXIT_CHECK);
            if let Some(stream) = listener.accept_timeout(slice)? {
                return Ok(stream);
            }
            if let Some(code) = process.try_wait()? {
                // It may have connected just before exiting.
                return match listener.accept_timeout(Duration::ZERO)? {
                    Some(stream) => Ok(stream),
                    None => Err(RenderError::worker(format!(
                        "worker exited with code {code} before connecting"
                    ))),
                };
            }
            if Instant::now() >= deadline {
                return Err(RenderError::worker(format!(
                    "worker did not connect within {:?}",
                    self.handshake_timeout
                )));
            }
        }
    }
}

/// Drain progress messages until the sentinel, crediting frames to `handle`.
///
/// Returns the output file named by the last message that carried one.
fn collect_progress(
    mut channel: MessageChannel<TcpStream>,
    job: &BatchJob,
    handle: &JobHandle,
) -> RenderResult<Option<PathBuf>> {
    let mut last_done = job.range.start;
    let mut output_file = None;
    while let Some(msg) = channel.recv::<ProgressMessage>()? {
        let frame = job.range.clamp(msg.current_frame);
        if frame > last_done {
            handle.add_frames(frame.abs_diff(last_done));
            last_done = frame;
        }
        if msg.output_file.is_some() {
            output_file = msg.output_file;
        }
    }
    // Deltas measured from the range start leave out exactly one frame.
    handle.add_frames(1);
    Ok(output_file)
}

#[cfg(test)]
#[path = "../tests/unit/supervisor/supervisor.rs"]
mod tests;
