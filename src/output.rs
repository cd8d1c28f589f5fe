//! Output file naming shared by batches, mixdown and the concatenated result.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::core::FrameRange;
use crate::foundation::error::RenderResult;

/// `<prefix><start:04>-<end:04>.<ext>`, the renderer's own naming for movie outputs.
///
/// `prefix` is a path whose last component may be a partial file name, e.g. `out/test` yields
/// `out/test0001-0030.mp4`.
pub fn range_output_path(prefix: &Path, range: FrameRange, ext: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(format!("{:04}-{:04}", range.start, range.end));
    if !ext.is_empty() {
        name.push(".");
        name.push(ext.trim_start_matches('.'));
    }
    PathBuf::from(name)
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> RenderResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Unique scratch path in the system temp dir.
pub fn temp_path(tag: &str, ext: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "parallel_render_{tag}_{}_{}.{ext}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    ))
}

/// Removes the wrapped file when dropped.
#[derive(Debug, Default)]
pub struct TempFileGuard(pub Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}
