use super::*;

const MINIMAL: &str = r#"{
    "renderer": "/usr/bin/blender",
    "project": "scene.blend",
    "worker_script": "worker.py",
    "scene": "Scene",
    "frame_start": 1,
    "frame_end": 30,
    "batch": {"fixed": {"increment": 10}},
    "output_prefix": "output/test"
}"#;

#[test]
fn minimal_job_gets_defaults() {
    let cfg = JobConfig::from_reader(MINIMAL.as_bytes()).unwrap();
    assert_eq!(cfg.batch, BatchPolicy::Fixed { increment: 10 });
    assert!(cfg.max_parallel >= 1);
    assert_eq!(cfg.container, "mp4");
    assert_eq!(cfg.mixdown_ext, "mp3");
    assert_eq!(cfg.handshake_timeout(), Duration::from_secs(30));
    assert!(!cfg.overwrite && !cfg.mixdown && !cfg.concatenate && !cfg.cleanup && !cfg.snapshot);
    assert_eq!(cfg.interval().unwrap(), FrameRange::new(1, 30).unwrap());
}

#[test]
fn unknown_fields_are_rejected() {
    let json = MINIMAL.replace("\"scene\":", "\"bogus\": 1, \"scene\":");
    assert!(matches!(
        JobConfig::from_reader(json.as_bytes()),
        Err(RenderError::Serde(_))
    ));
}

#[test]
fn invalid_values_are_rejected() {
    for (from, to) in [
        ("\"frame_end\": 30", "\"frame_end\": 0"),
        ("{\"increment\": 10}", "{\"increment\": 0}"),
        ("\"output_prefix\"", "\"max_parallel\": 0, \"output_prefix\""),
        ("\"output_prefix\"", "\"handshake_timeout_secs\": 0, \"output_prefix\""),
        ("\"output_prefix\"", "\"mixdown\": true, \"output_prefix\""),
        ("\"scene\": \"Scene\"", "\"scene\": \"\""),
    ] {
        let json = MINIMAL.replace(from, to);
        assert!(
            matches!(
                JobConfig::from_reader(json.as_bytes()),
                Err(RenderError::Validation(_))
            ),
            "expected validation error for {to}"
        );
    }
}

#[test]
fn mixdown_with_script_is_accepted() {
    let json = MINIMAL.replace(
        "\"output_prefix\"",
        "\"mixdown\": true, \"mixdown_script\": \"mix.py\", \"output_prefix\"",
    );
    let cfg = JobConfig::from_reader(json.as_bytes()).unwrap();
    assert_eq!(cfg.mixdown_script, Some(PathBuf::from("mix.py")));
}

#[test]
fn missing_file_is_a_validation_error() {
    assert!(matches!(
        JobConfig::from_path("/no/such/job.json"),
        Err(RenderError::Validation(_))
    ));
}
