use super::*;

fn range(start: i64, end: i64) -> FrameRange {
    FrameRange::new(start, end).unwrap()
}

fn pairs(ranges: &[FrameRange]) -> Vec<(i64, i64)> {
    ranges.iter().map(|r| (r.start, r.end)).collect()
}

fn assert_exact_cover(interval: FrameRange, ranges: &[FrameRange]) {
    assert!(!ranges.is_empty());
    assert_eq!(ranges[0].start, interval.start);
    assert_eq!(ranges[ranges.len() - 1].end, interval.end);
    for r in ranges {
        assert!(r.start <= r.end, "empty range {r}");
    }
    for w in ranges.windows(2) {
        assert_eq!(w[0].end + 1, w[1].start, "gap or overlap at {} / {}", w[0], w[1]);
    }
    let covered: u64 = ranges.iter().map(|r| r.len_frames()).sum();
    assert_eq!(covered, interval.len_frames());
}

#[test]
fn parts_splits_evenly() {
    assert_eq!(
        pairs(&ranges_parts(range(12, 134), 4).unwrap()),
        vec![(12, 41), (42, 72), (73, 103), (104, 134)]
    );
}

#[test]
fn parts_collapse_when_interval_is_tiny() {
    assert_eq!(pairs(&ranges_parts(range(8, 11), 4).unwrap()), vec![(8, 11)]);
}

#[test]
fn parts_small_interval_keeps_single_frame_batches() {
    assert_eq!(
        pairs(&ranges_parts(range(8, 13), 4).unwrap()),
        vec![(8, 8), (9, 10), (11, 11), (12, 13)]
    );
}

#[test]
fn fixed_clips_last_batch() {
    assert_eq!(
        pairs(&ranges_fixed(range(12, 134), 31).unwrap()),
        vec![(12, 43), (44, 75), (76, 107), (108, 134)]
    );
}

#[test]
fn fixed_exact_and_near_exact_fits() {
    assert_eq!(pairs(&ranges_fixed(range(25, 55), 31).unwrap()), vec![(25, 55)]);
    assert_eq!(pairs(&ranges_fixed(range(25, 56), 31).unwrap()), vec![(25, 56)]);
    assert_eq!(
        pairs(&ranges_fixed(range(25, 57), 31).unwrap()),
        vec![(25, 56), (57, 57)]
    );
}

#[test]
fn fixed_nine_over_hundred_frames() {
    let got = ranges_fixed(range(1, 100), 9).unwrap();
    assert_eq!(got.len(), 10);
    assert_eq!(got[0], range(1, 10));
    assert_eq!(got[9], range(91, 100));
}

#[test]
fn fixed_ten_matches_end_to_end_boundaries() {
    assert_eq!(
        pairs(&ranges_fixed(range(1, 30), 10).unwrap()),
        vec![(1, 11), (12, 22), (23, 30)]
    );
}

#[test]
fn single_frame_yields_one_range_for_every_policy() {
    let one = range(7, 7);
    for policy in [
        BatchPolicy::Fixed { increment: 1 },
        BatchPolicy::Fixed { increment: 300 },
        BatchPolicy::Parts { parts: 1 },
        BatchPolicy::Parts { parts: 16 },
    ] {
        assert_eq!(policy.partition(one).unwrap(), vec![one]);
    }
}

#[test]
fn zero_parameters_are_rejected() {
    assert!(ranges_fixed(range(1, 10), 0).is_err());
    assert!(ranges_parts(range(1, 10), 0).is_err());
}

#[test]
fn parts_cover_every_frame_exactly_once() {
    for start in [-5i64, 0, 1, 12] {
        for len in 1i64..=60 {
            let interval = range(start, start + len - 1);
            for parts in 1u32..=12 {
                let got = ranges_parts(interval, parts).unwrap();
                assert_exact_cover(interval, &got);
                assert!(got.len() <= parts as usize);
                if (len as u64) <= u64::from(parts) {
                    assert_eq!(got.len(), 1);
                }
            }
        }
    }
}

#[test]
fn fixed_cover_every_frame_exactly_once() {
    for start in [-5i64, 0, 1, 12] {
        for len in 1i64..=60 {
            let interval = range(start, start + len - 1);
            for increment in 1u32..=12 {
                let got = ranges_fixed(interval, increment).unwrap();
                assert_exact_cover(interval, &got);
                for r in &got[..got.len() - 1] {
                    assert_eq!(r.len_frames(), u64::from(increment) + 1);
                }
                assert!(got[got.len() - 1].len_frames() <= u64::from(increment) + 1);
            }
        }
    }
}

#[test]
fn total_frames_spans_all_ranges() {
    let got = ranges_fixed(range(1, 30), 10).unwrap();
    assert_eq!(total_frames(&got), 30);
    assert_eq!(total_frames(&[]), 0);
}

#[test]
fn policy_deserializes_from_tagged_json() {
    let p: BatchPolicy = serde_json::from_str(r#"{"fixed":{"increment":10}}"#).unwrap();
    assert_eq!(p, BatchPolicy::Fixed { increment: 10 });
    let p: BatchPolicy = serde_json::from_str(r#"{"parts":{"parts":4}}"#).unwrap();
    assert_eq!(p, BatchPolicy::Parts { parts: 4 });
}

#[test]
fn reversed_interval_is_rejected() {
    let reversed = FrameRange { start: 5, end: 1 };
    assert!(matches!(
        ranges_fixed(reversed, 3),
        Err(RenderError::Validation(_))
    ));
    assert!(matches!(
        ranges_parts(reversed, 3),
        Err(RenderError::Validation(_))
    ));
    assert!(BatchPolicy::Fixed { increment: 3 }.partition(reversed).is_err());
}

#[test]
fn intervals_at_the_i64_limits_do_not_overflow() {
    let low = range(i64::MIN, i64::MIN + 9);
    let got = ranges_parts(low, 3).unwrap();
    assert_exact_cover(low, &got);
    assert_eq!(got[0].start, i64::MIN);

    let high = range(i64::MAX - 9, i64::MAX);
    assert_exact_cover(high, &ranges_parts(high, 4).unwrap());
    assert_exact_cover(high, &ranges_fixed(high, 3).unwrap());

    let all = range(i64::MIN, i64::MAX);
    let got = ranges_parts(all, 2).unwrap();
    assert_eq!(got.len(), 2);
    assert_eq!(got[0].start, i64::MIN);
    assert_eq!(got[1].end, i64::MAX);
    assert_eq!(got[0].end + 1, got[1].start);
}
