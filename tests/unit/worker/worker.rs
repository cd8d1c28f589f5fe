use super::*;
use crate::channel::write_frame;
use std::net::TcpListener;

fn handshake_for(listener: &TcpListener, start: i64, end: i64) -> Handshake {
    Handshake::new(
        listener.local_addr().unwrap(),
        WorkerArgs {
            scene: "Scene".to_string(),
            start_frame: start,
            end_frame: end,
            overwrite: false,
        },
    )
}

#[test]
fn session_reads_handshake_and_reports_in_order() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut stdin = Vec::new();
    write_frame(&mut stdin, Some(&handshake_for(&listener, 5, 7))).unwrap();

    let worker = std::thread::spawn(move || {
        let mut session = WorkerSession::from_reader(&mut stdin.as_slice()).unwrap();
        assert_eq!(session.args().scene, "Scene");
        session.report_frame(5).unwrap();
        session.report_frame(6).unwrap();
        session.finish(Some(Path::new("/r/out0005-0007.mp4"))).unwrap();
    });

    let (stream, _) = listener.accept().unwrap();
    let mut channel = MessageChannel::new(stream);
    let mut got = Vec::new();
    while let Some(msg) = channel.recv::<ProgressMessage>().unwrap() {
        got.push(msg);
    }
    worker.join().unwrap();

    assert_eq!(
        got,
        vec![
            ProgressMessage::frame(5),
            ProgressMessage::frame(6),
            ProgressMessage::finished(7, "/r/out0005-0007.mp4"),
        ]
    );
}

#[test]
fn finish_without_output_still_ends_the_stream() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let handshake = handshake_for(&listener, 1, 3);
    let worker = std::thread::spawn(move || {
        WorkerSession::connect(handshake).unwrap().finish(None).unwrap();
    });

    let (stream, _) = listener.accept().unwrap();
    let mut channel = MessageChannel::new(stream);
    let last: ProgressMessage = channel.recv().unwrap().unwrap();
    assert_eq!(last, ProgressMessage::frame(3));
    assert_eq!(channel.recv::<ProgressMessage>().unwrap(), None);
    worker.join().unwrap();
}

#[test]
fn empty_or_missing_handshake_is_rejected() {
    let mut sentinel = Vec::new();
    write_frame::<_, Handshake>(&mut sentinel, None).unwrap();
    assert!(matches!(
        WorkerSession::from_reader(&mut sentinel.as_slice()),
        Err(RenderError::Protocol(_))
    ));
    assert!(matches!(
        WorkerSession::from_reader(&mut std::io::empty()),
        Err(RenderError::ConnectionTerminated)
    ));
}

#[test]
fn skip_only_when_output_exists_and_overwrite_is_off() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.mp4");
    let mut args = WorkerArgs {
        scene: "Scene".to_string(),
        start_frame: 1,
        end_frame: 2,
        overwrite: false,
    };
    assert!(!args.should_skip(&out));
    std::fs::write(&out, b"x").unwrap();
    assert!(args.should_skip(&out));
    args.overwrite = true;
    assert!(!args.should_skip(&out));
}
