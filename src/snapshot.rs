//! The project file that workers render from.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::{RenderError, RenderResult};

/// Original project, or a temporary copy of it, for the duration of one job run.
///
/// A copy is placed next to the original so project-relative paths still resolve. Dropping the
/// snapshot deletes the copy together with any backup or autosave files the renderer wrote beside
/// it; the original is never touched.
#[derive(Debug)]
pub struct ProjectSnapshot {
    path: PathBuf,
    temporary: bool,
}

impl ProjectSnapshot {
    /// Use `project` directly.
    pub fn original(project: &Path) -> RenderResult<Self> {
        ensure_project(project)?;
        Ok(Self {
            path: project.to_path_buf(),
            temporary: false,
        })
    }

    /// Copy `project` to a sibling temporary file.
    pub fn copy_of(project: &Path) -> RenderResult<Self> {
        ensure_project(project)?;
        let path = sibling_copy_path(project);
        std::fs::copy(project, &path).with_context(|| {
            format!(
                "copy project '{}' to '{}'",
                project.display(),
                path.display()
            )
        })?;
        tracing::debug!(copy = %path.display(), "created temporary project copy");
        Ok(Self {
            path,
            temporary: true,
        })
    }

    /// Original when `needs_copy` is false, temporary copy otherwise.
    pub fn prepare(project: &Path, needs_copy: bool) -> RenderResult<Self> {
        if needs_copy {
            Self::copy_of(project)
        } else {
            Self::original(project)
        }
    }

    /// File workers should open.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `true` when the snapshot is a temporary copy.
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    fn dispose(&self) {
        if !self.temporary {
            return;
        }
        for path in std::iter::once(self.path.clone()).chain(sidecar_files(&self.path)) {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed snapshot file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove snapshot file")
                }
            }
        }
    }
}

impl Drop for ProjectSnapshot {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn ensure_project(project: &Path) -> RenderResult<()> {
    if !project.is_file() {
        return Err(RenderError::validation(format!(
            "project file '{}' does not exist",
            project.display()
        )));
    }
    Ok(())
}

fn sibling_copy_path(project: &Path) -> PathBuf {
    let stem = project
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut name = OsString::from(format!(
        ".{stem}-parallel-render-{}-{nanos}",
        std::process::id()
    ));
    if let Some(ext) = project.extension() {
        name.push(".");
        name.push(ext);
    }
    project.with_file_name(name)
}

/// Files next to `path` whose name extends it, e.g. `scene.blend1` or `scene.blend@`.
fn sidecar_files(path: &Path) -> Vec<PathBuf> {
    let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
        return Vec::new();
    };
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    let name = name.to_string_lossy().into_owned();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter(|e| {
            let other = e.file_name().to_string_lossy().into_owned();
            other.len() > name.len() && other.starts_with(&name)
        })
        .map(|e| e.path())
        .collect()
}

#[cfg(test)]
#[path = "../tests/unit/snapshot/snapshot.rs"]
mod tests;
