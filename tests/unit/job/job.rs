use super::*;

fn result(start: i64, end: i64, exit_code: Option<i32>) -> BatchResult {
    BatchResult {
        range: FrameRange::new(start, end).unwrap(),
        exit_code,
        output_file: None,
    }
}

#[test]
fn only_zero_exit_code_succeeds() {
    assert!(result(1, 2, Some(0)).succeeded());
    assert!(!result(1, 2, Some(1)).succeeded());
    assert!(!result(1, 2, Some(-11)).succeeded());
    assert!(!result(1, 2, None).succeeded());

    assert!(result(1, 2, Some(SUPERVISOR_FAILURE)).failed());
    assert!(!result(1, 2, None).failed());
    assert!(!result(1, 2, Some(0)).failed());
}

#[test]
fn progress_line_matches_report_format() {
    let status = JobStatus {
        state: JobState::Running,
        summary: JobSummary {
            total_batches: 3,
            batches_done: 1,
            total_frames: 30,
            frames_done: 11,
        },
        finished: false,
    };
    assert_eq!(
        status.progress_line(),
        "Completed Batches: 1/3 Frames: 11/30 [36.7%]"
    );

    let failed = JobStatus {
        state: JobState::Failed,
        ..status
    };
    assert!(failed.progress_line().starts_with("Failed Batches: 1/3"));
}

#[test]
fn percent_of_empty_job_is_zero() {
    assert_eq!(JobSummary::default().percent(), 0.0);
}

#[test]
fn counters_are_clamped_to_totals() {
    let h = JobHandle::new();
    h.begin(2, 10);
    h.add_frames(7);
    h.add_frames(7);
    let r = result(1, 5, Some(0));
    h.record_batch(&r);
    h.record_batch(&r);
    h.record_batch(&r);
    let s = h.status().summary;
    assert_eq!(s.frames_done, 10);
    assert_eq!(s.batches_done, 2);
}

#[test]
fn failing_batch_moves_job_to_failed() {
    let h = JobHandle::new();
    h.begin(2, 10);
    assert_eq!(h.record_batch(&result(1, 5, Some(0))).state, JobState::Running);
    assert_eq!(h.record_batch(&result(6, 10, Some(2))).state, JobState::Failed);
    assert!(!h.checkpoint());
    assert_eq!(h.finish().outcome(), RunOutcome::Failed);
}

#[test]
fn skipped_batch_does_not_fail_job() {
    let h = JobHandle::new();
    h.begin(1, 5);
    assert_eq!(h.record_batch(&result(1, 5, None)).state, JobState::Running);
}

#[test]
fn stages_return_to_running_then_done() {
    let h = JobHandle::new();
    h.begin(1, 1);
    assert!(h.enter_stage(JobState::Mixdown));
    assert_eq!(h.state(), JobState::Mixdown);
    assert_eq!(h.outcome(), RunOutcome::Pending);
    h.leave_stage(JobState::Mixdown, true);
    assert_eq!(h.state(), JobState::Running);

    assert!(h.enter_stage(JobState::Concatenate));
    h.leave_stage(JobState::Concatenate, false);
    assert_eq!(h.state(), JobState::Failed);
    assert!(!h.enter_stage(JobState::Cleaning));
}

#[test]
fn cancel_is_cooperative() {
    let h = JobHandle::new();
    h.begin(1, 1);
    assert!(h.enter_stage(JobState::Mixdown));
    h.cancel();
    // The running stage is not interrupted.
    assert_eq!(h.state(), JobState::Mixdown);
    h.leave_stage(JobState::Mixdown, true);
    assert!(!h.enter_stage(JobState::Concatenate));
    assert_eq!(h.state(), JobState::Cancelling);

    let status = h.finish();
    assert_eq!(status.state, JobState::Cancelling);
    assert_eq!(status.outcome(), RunOutcome::Failed);
}

#[test]
fn handle_clones_share_state() {
    let h = JobHandle::new();
    let observer = h.clone();
    h.begin(4, 40);
    h.add_frames(3);
    assert_eq!(observer.status().summary.frames_done, 3);
    observer.cancel();
    assert_eq!(h.state(), JobState::Cancelling);
}
