use super::*;

#[test]
fn thread_pool_requires_a_thread() {
    assert!(matches!(build_thread_pool(0), Err(RenderError::Validation(_))));
    assert_eq!(build_thread_pool(3).unwrap().current_num_threads(), 3);
}

#[test]
fn relative_and_absolute_spellings_are_the_same_file() {
    let cwd = std::env::current_dir().unwrap();
    assert!(same_file(Path::new("out/a.mp4"), &cwd.join("out/a.mp4")));
    assert!(!same_file(Path::new("out/a.mp4"), Path::new("out/b.mp4")));
}

#[test]
fn missing_concat_tool_leaves_job_running() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = single_batch_job(dir.path(), None);
    let handle = JobHandle::new();
    handle.begin(1, 2);
    let results = vec![single_part(dir.path())];
    let out = Dispatcher::new(&cfg)
        .post_process(dir.path(), FrameRange::new(1, 2).unwrap(), &results, &handle)
        .unwrap();
    assert_eq!(out.concatenated, None);
    assert_eq!(handle.state(), JobState::Running);
}

#[cfg(unix)]
#[test]
fn single_part_named_like_the_final_output_is_not_concatenated() {
    use std::os::unix::fs::PermissionsExt as _;

    let dir = tempfile::tempdir().unwrap();
    let tool = dir.path().join("ffmpeg");
    std::fs::write(&tool, "#!/bin/sh\nexit 9\n").unwrap();
    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
    let cfg = single_batch_job(dir.path(), Some(tool));
    let handle = JobHandle::new();
    handle.begin(1, 2);
    let results = vec![single_part(dir.path())];
    let out = Dispatcher::new(&cfg)
        .post_process(dir.path(), FrameRange::new(1, 2).unwrap(), &results, &handle)
        .unwrap();
    assert_eq!(out.concatenated, Some(dir.path().join("t0001-0002.mp4")));
    assert_eq!(handle.state(), JobState::Running);
}

fn single_part(dir: &Path) -> BatchResult {
    BatchResult {
        range: FrameRange::new(1, 2).unwrap(),
        exit_code: Some(0),
        output_file: Some(dir.join("t0001-0002.mp4")),
    }
}

fn single_batch_job(dir: &Path, concat_tool: Option<PathBuf>) -> JobConfig {
    let project = dir.join("p.blend");
    std::fs::write(&project, b"p").unwrap();
    JobConfig {
        renderer: "renderer".into(),
        project,
        worker_script: "w.py".into(),
        mixdown_script: None,
        scene: "Scene".into(),
        frame_start: 1,
        frame_end: 2,
        batch: crate::partition::BatchPolicy::Fixed { increment: 1 },
        max_parallel: 1,
        overwrite: true,
        mixdown: false,
        concatenate: true,
        cleanup: false,
        concat_tool,
        output_prefix: dir.join("t"),
        container: "mp4".into(),
        mixdown_ext: "mp3".into(),
        handshake_timeout_secs: 1,
        snapshot: false,
    }
}
