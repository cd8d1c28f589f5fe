//! Post-processing stages run after every batch succeeded: audio mixdown, concatenation, cleanup.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::Context as _;

use crate::foundation::core::FrameRange;
use crate::foundation::error::{RenderError, RenderResult};
use crate::job::BatchResult;
use crate::output::ensure_parent_dir;
use crate::supervisor::exit_code;

/// Exports the project's audio track for `range` to a standalone file.
pub trait AudioMixdown: Send + Sync {
    /// Write the mixed audio to `out`.
    fn mixdown(&self, range: FrameRange, out: &Path) -> RenderResult<()>;
}

/// Mixdown delegated to the renderer's own audio export.
///
/// Runs `renderer <project> --background --python <script> -- <out> <start> <end>`.
#[derive(Clone, Debug)]
pub struct RendererMixdown {
    /// Renderer executable.
    pub renderer: PathBuf,
    /// Project file to export from.
    pub project: PathBuf,
    /// Script performing the export.
    pub script: PathBuf,
}

impl AudioMixdown for RendererMixdown {
    fn mixdown(&self, range: FrameRange, out: &Path) -> RenderResult<()> {
        ensure_parent_dir(out)?;
        let status = Command::new(&self.renderer)
            .arg(&self.project)
            .args(["--background", "--python"])
            .arg(&self.script)
            .arg("--")
            .arg(out)
            .args([range.start.to_string(), range.end.to_string()])
            .stdin(Stdio::null())
            .status()
            .map_err(|e| {
                RenderError::pipeline(format!(
                    "failed to spawn renderer '{}' for mixdown: {e}",
                    self.renderer.display()
                ))
            })?;
        if !status.success() {
            return Err(RenderError::pipeline(format!(
                "mixdown exited with status {status}"
            )));
        }
        if !out.exists() {
            return Err(RenderError::pipeline(format!(
                "mixdown did not produce '{}'",
                out.display()
            )));
        }
        Ok(())
    }
}

/// Result of checking a configured concatenation executable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolStatus {
    /// Usable.
    Valid,
    /// No path configured.
    Unset,
    /// Path does not exist.
    Missing,
    /// Path exists but is not a regular file.
    NotAFile,
    /// Regular file without execute permission.
    NotExecutable,
}

impl ToolStatus {
    /// `true` for [`ToolStatus::Valid`].
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }

    /// Short explanation for logs and the CLI.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Unset => "no executable configured",
            Self::Missing => "path does not exist",
            Self::NotAFile => "path is not a regular file",
            Self::NotExecutable => "file is not executable",
        }
    }
}

/// Check that `path` exists, is a regular file and is executable.
pub fn validate_tool(path: Option<&Path>) -> ToolStatus {
    let Some(path) = path.filter(|p| !p.as_os_str().is_empty()) else {
        return ToolStatus::Unset;
    };
    let Ok(meta) = std::fs::metadata(path) else {
        return ToolStatus::Missing;
    };
    if !meta.is_file() {
        return ToolStatus::NotAFile;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        if meta.permissions().mode() & 0o111 == 0 {
            return ToolStatus::NotExecutable;
        }
    }
    ToolStatus::Valid
}

/// Audio codec used when muxing mixed audio into a container with extension `container`.
pub fn audio_codec_for_container(container: &str) -> &'static str {
    match container.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "avi" => "libmp3lame",
        "ogg" | "ogv" => "libvorbis",
        "webm" => "libopus",
        _ => "aac",
    }
}

/// Playlist body for the concat demuxer: one `file '<abs path>'` line per part, in range order.
pub fn playlist_contents(results: &[BatchResult]) -> RenderResult<String> {
    let mut parts: Vec<&BatchResult> = results.iter().filter(|r| r.succeeded()).collect();
    parts.sort_by_key(|r| r.range.start);

    let mut out = String::new();
    for r in parts {
        let file = r.output_file.as_ref().ok_or_else(|| {
            RenderError::pipeline(format!("batch {} reported no output file", r.range))
        })?;
        let abs = std::path::absolute(file)
            .with_context(|| format!("resolve part path '{}'", file.display()))?;
        // Single quotes inside the path must be closed, escaped and reopened for the demuxer.
        let quoted = abs.to_string_lossy().replace('\'', r"'\''");
        out.push_str(&format!("file '{quoted}'\n"));
    }
    Ok(out)
}

/// Write [`playlist_contents`] to `path`.
pub fn write_playlist(path: &Path, results: &[BatchResult]) -> RenderResult<()> {
    let body = playlist_contents(results)?;
    std::fs::write(path, body)
        .with_context(|| format!("write concat playlist '{}'", path.display()))?;
    Ok(())
}

/// Validated external concatenation tool (an `ffmpeg` binary).
#[derive(Clone, Debug)]
pub struct ConcatTool {
    path: PathBuf,
}

/// One concatenation request.
#[derive(Clone, Debug)]
pub struct ConcatRequest<'a> {
    /// Playlist written by [`write_playlist`].
    pub playlist: &'a Path,
    /// Mixed audio to mux in, if a mixdown ran.
    pub audio: Option<&'a Path>,
    /// Final output file.
    pub output: &'a Path,
    /// Replace `output` if it exists.
    pub overwrite: bool,
}

impl ConcatTool {
    /// Validate `path`; returns the tool or the reason it cannot be used.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ToolStatus> {
        let path = path.into();
        match validate_tool(Some(&path)) {
            ToolStatus::Valid => Ok(Self { path }),
            status => Err(status),
        }
    }

    /// Path to the executable.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full command for `req`: concat demuxer, video stream copy, optional re-encoded audio.
    pub fn command(&self, req: &ConcatRequest<'_>) -> Command {
        let mut cmd = Command::new(&self.path);
        cmd.args(["-loglevel", "error", "-f", "concat", "-safe", "0", "-i"])
            .arg(req.playlist);
        if let Some(audio) = req.audio {
            cmd.arg("-i").arg(audio);
            cmd.args(["-map", "0:v", "-map", "1:a"]);
        }
        cmd.args(["-codec:v", "copy"]);
        if req.audio.is_some() {
            let container = req
                .output
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default();
            cmd.args(["-codec:a", audio_codec_for_container(&container)]);
        }
        cmd.arg(if req.overwrite { "-y" } else { "-n" });
        cmd.arg(req.output);
        cmd
    }

    /// Run the tool and return its exit code.
    pub fn run(&self, req: &ConcatRequest<'_>) -> RenderResult<i32> {
        ensure_parent_dir(req.output)?;
        let output = self
            .command(req)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                RenderError::pipeline(format!(
                    "failed to spawn concat tool '{}': {e}",
                    self.path.display()
                ))
            })?;
        let code = exit_code(output.status);
        if code != 0 {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(code, stderr = %stderr.trim(), "concatenation failed");
        }
        Ok(code)
    }
}

/// Delete `paths`, ignoring files that are already gone. Returns how many were removed.
pub fn remove_files<'a>(paths: impl IntoIterator<Item = &'a Path>) -> usize {
    let mut removed = 0;
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove file"),
        }
    }
    removed
}

#[cfg(test)]
#[path = "../tests/unit/post/post.rs"]
mod tests;
