//! Frame-range partitioning.
//!
//! A job interval is split into batches using one of two strategies. Both return ranges that are
//! ordered by start, contiguous, non-empty, and cover every frame of the interval exactly once.

use crate::foundation::core::FrameRange;
use crate::foundation::error::{RenderError, RenderResult};

/// How a job interval is split into batches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// Batches of `increment + 1` frames each, the last one clipped to the interval end.
    Fixed {
        /// Step between batch starts minus one. Must be >= 1.
        increment: u32,
    },
    /// At most `parts` batches whose sizes differ by at most one frame.
    Parts {
        /// Requested number of batches. Must be >= 1.
        parts: u32,
    },
}

impl BatchPolicy {
    /// Split `interval` according to this policy.
    pub fn partition(self, interval: FrameRange) -> RenderResult<Vec<FrameRange>> {
        match self {
            Self::Fixed { increment } => ranges_fixed(interval, increment),
            Self::Parts { parts } => ranges_parts(interval, parts),
        }
    }
}

/// Fixed-size batches: `(start, min(start + increment, end))`, stepping by `increment + 1`.
pub fn ranges_fixed(interval: FrameRange, increment: u32) -> RenderResult<Vec<FrameRange>> {
    let interval = FrameRange::new(interval.start, interval.end)?;
    if increment < 1 {
        return Err(RenderError::validation(
            "fixed batch increment must be >= 1",
        ));
    }
    let step = i64::from(increment);
    let mut out = Vec::new();
    let mut start = interval.start;
    loop {
        let end = start.saturating_add(step).min(interval.end);
        out.push(FrameRange { start, end });
        if end == interval.end {
            break;
        }
        start = end + 1;
    }
    Ok(out)
}

/// Split into `parts` batches using truncated `i * length / parts` boundaries.
///
/// When the interval has no more frames than requested parts the whole interval becomes a single
/// batch.
pub fn ranges_parts(interval: FrameRange, parts: u32) -> RenderResult<Vec<FrameRange>> {
    let interval = FrameRange::new(interval.start, interval.end)?;
    if parts < 1 {
        return Err(RenderError::validation("batch parts must be >= 1"));
    }
    // i128 keeps `start - 1` and `i * length` exact across the whole i64 range.
    let base = i128::from(interval.start) - 1;
    let length = i128::from(interval.end) - base;
    let parts = i128::from(parts);
    if length <= parts {
        return Ok(vec![interval]);
    }

    let mut out = Vec::with_capacity(parts as usize);
    let mut start = base;
    for i in 1..=parts {
        let end = base + i * length / parts;
        out.push(FrameRange {
            start: narrow(start + 1)?,
            end: narrow(end)?,
        });
        start = end;
    }
    Ok(out)
}

fn narrow(frame: i128) -> RenderResult<i64> {
    i64::try_from(frame)
        .map_err(|_| RenderError::validation(format!("frame {frame} is outside the i64 range")))
}

/// Number of frames spanned by all `ranges`, from the lowest start to the highest end.
pub fn total_frames(ranges: &[FrameRange]) -> u64 {
    let start = ranges.iter().map(|r| r.start).min();
    let end = ranges.iter().map(|r| r.end).max();
    match (start, end) {
        (Some(start), Some(end)) => end.abs_diff(start).saturating_add(1),
        _ => 0,
    }
}

#[cfg(test)]
#[path = "../tests/unit/partition/partition.rs"]
mod tests;
