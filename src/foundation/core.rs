use crate::foundation::error::{RenderError, RenderResult};

/// Inclusive frame range `[start, end]` in renderer timeline space.
///
/// Renderers address frames with inclusive bounds, so a range with `start == end` holds exactly one
/// frame and an empty range cannot be represented.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameRange {
    /// First frame of the range.
    pub start: i64,
    /// Last frame of the range (inclusive).
    pub end: i64,
}

impl FrameRange {
    /// Create a validated range with `start <= end`.
    pub fn new(start: i64, end: i64) -> RenderResult<Self> {
        if start > end {
            return Err(RenderError::validation(format!(
                "frame range start must be <= end (got {start}..{end})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Number of frames contained in the range, saturating at `u64::MAX`.
    pub fn len_frames(self) -> u64 {
        self.end.abs_diff(self.start).saturating_add(1)
    }

    /// Return `true` when `frame` is inside `[start, end]`.
    pub fn contains(self, frame: i64) -> bool {
        self.start <= frame && frame <= self.end
    }

    /// Clamp a frame number into this range.
    pub fn clamp(self, frame: i64) -> i64 {
        frame.clamp(self.start, self.end)
    }
}

impl std::fmt::Display for FrameRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
