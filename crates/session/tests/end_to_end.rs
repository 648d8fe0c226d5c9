//! Full sessions over loopback: HTTP downloads, URL push, operator control.

use std::io::Cursor;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use sideload_push::wire::read_frame;
use sideload_session::{
    SessionConfig, SessionError, SessionOrchestrator, SessionSinks, SessionState, resolve_targets,
};
use sideload_transfer::{LogSink, ProgressEvent, ProgressSink};

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

type Shared<T> = Arc<Mutex<Vec<T>>>;

fn recording_sinks() -> (SessionSinks, Shared<ProgressEvent>, Shared<String>) {
    let events: Shared<ProgressEvent> = Arc::default();
    let lines: Shared<String> = Arc::default();

    let ev = Arc::clone(&events);
    let progress: Arc<dyn ProgressSink> =
        Arc::new(move |event: ProgressEvent| ev.lock().unwrap().push(event));
    let ln = Arc::clone(&lines);
    let log: Arc<dyn LogSink> = Arc::new(move |line: &str| ln.lock().unwrap().push(line.into()));

    (SessionSinks::new(progress, log), events, lines)
}

fn loopback_config(receiver_port: u16) -> SessionConfig {
    let mut config = SessionConfig::new(LOCALHOST, LOCALHOST);
    config.bind_ip = LOCALHOST;
    config.port = 0;
    config.chunk_size = 16 * 1024;
    config.receiver_port = receiver_port;
    config.push.retries = 2;
    config.push.retry_delay = Duration::from_millis(100);
    config.push.connect_timeout = Duration::from_secs(2);
    config.push.ack_wait = Duration::from_millis(500);
    config
}

fn closed_port() -> u16 {
    let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    l.local_addr().unwrap().port()
}

/// Accepts one push, acknowledges it and returns the URL list.
async fn one_shot_receiver() -> (u16, tokio::task::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let payload = read_frame(&mut sock, 1024 * 1024).await.unwrap();
        sock.write_all(&[1]).await.unwrap();
        String::from_utf8(payload)
            .unwrap()
            .split('\n')
            .map(str::to_string)
            .collect()
    });
    (port, handle)
}

async fn wait_for_line(lines: &Shared<String>, prefix: &str) {
    for _ in 0..100 {
        if lines.lock().unwrap().iter().any(|l| l.starts_with(prefix)) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("no log line starting with {prefix:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_is_pushed_and_downloaded() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.cia"), vec![1u8; 10]).unwrap();
    std::fs::write(dir.path().join("b.tik"), Vec::<u8>::new()).unwrap();
    std::fs::write(dir.path().join("c.cia"), vec![3u8; 1_048_576]).unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let (receiver_port, receiver) = one_shot_receiver().await;
    let (sinks, events, lines) = recording_sinks();
    let orchestrator = Arc::new(SessionOrchestrator::new(
        loopback_config(receiver_port),
        sinks,
    ));
    let mut state = orchestrator.state();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let path = dir.path().to_path_buf();
    let session = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .run(path, Cursor::new(Vec::<u8>::new()), async {
                    let _ = stop_rx.await;
                })
                .await
        })
    };

    let urls = receiver.await.unwrap();
    assert_eq!(urls.len(), 3);
    assert!(urls[0].ends_with("/a.cia"));
    assert!(urls[1].ends_with("/b.tik"));
    assert!(urls[2].ends_with("/c.cia"));
    assert_ne!(*state.borrow_and_update(), SessionState::Init);

    let client = reqwest::Client::new();
    let mut sizes = Vec::new();
    for url in &urls {
        let resp = client.get(url).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        sizes.push(resp.bytes().await.unwrap().len());
    }
    assert_eq!(sizes, vec![10, 0, 1_048_576]);

    wait_for_line(&lines, "URL PUSH: delivered (ACK received)").await;
    stop_tx.send(()).unwrap();
    let report = session.await.unwrap().unwrap();

    assert_eq!(report.files, 3);
    assert_eq!(report.total_bytes, 1_048_586);
    assert_eq!(report.batch_sent, 1_048_586);
    assert_eq!(report.urls, urls);
    assert_eq!(report.pushes.len(), 1);
    assert!(report.pushes[0].delivered && report.pushes[0].acked);
    assert_eq!(*orchestrator.state().borrow(), SessionState::Stopped);

    let events = events.lock().unwrap().clone();
    let mut done: Vec<(String, String, u64)> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Done(s) => Some((s.filename.clone(), s.index.to_string(), s.bytes_sent)),
            _ => None,
        })
        .collect();
    done.sort();
    assert_eq!(
        done,
        vec![
            ("a.cia".into(), "1/3".into(), 10),
            ("b.tik".into(), "2/3".into(), 0),
            ("c.cia".into(), "3/3".into(), 1_048_576),
        ]
    );
    assert!(
        !events
            .iter()
            .any(|e| e.filename() == "b.tik" && matches!(e, ProgressEvent::Progress(_))),
        "zero-byte files never report progress"
    );

    let lines = lines.lock().unwrap().clone();
    assert!(lines[0].starts_with("START | TARGET=127.0.0.1"));
    assert!(lines[0].ends_with("FILES=3 | BYTES=1048586"));
    assert_eq!(lines[1], "URL LIST:");
    for (i, url) in urls.iter().enumerate() {
        assert_eq!(lines[2 + i], format!("  {url}"));
    }
    assert_eq!(lines.last().unwrap(), "STOP");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_path_fails_before_any_socket() {
    let receiver = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    receiver.set_nonblocking(true).unwrap();
    let receiver_port = receiver.local_addr().unwrap().port();

    let (sinks, events, lines) = recording_sinks();
    let orchestrator = SessionOrchestrator::new(loopback_config(receiver_port), sinks);

    let result = orchestrator
        .run(
            "/nonexistent/dir/game.cia",
            Cursor::new(Vec::<u8>::new()),
            std::future::pending(),
        )
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, SessionError::FileResolution(_)));
    assert!(err.is_configuration());
    assert_eq!(*orchestrator.state().borrow(), SessionState::Stopped);

    // Nothing was logged, served or pushed.
    assert!(lines.lock().unwrap().is_empty());
    assert!(events.lock().unwrap().is_empty());
    let accepted = receiver.accept();
    assert_eq!(
        accepted.unwrap_err().kind(),
        std::io::ErrorKind::WouldBlock
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_push_keeps_serving() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("game.cia"), vec![9u8; 4096]).unwrap();

    let (sinks, _events, lines) = recording_sinks();
    let orchestrator = Arc::new(SessionOrchestrator::new(
        loopback_config(closed_port()),
        sinks,
    ));

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let path = dir.path().join("game.cia");
    let session = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .run(path, Cursor::new(Vec::<u8>::new()), async {
                    let _ = stop_rx.await;
                })
                .await
        })
    };

    wait_for_line(&lines, "URL PUSH FAIL: ").await;
    assert_eq!(*orchestrator.state().borrow(), SessionState::Serving);

    let url = lines
        .lock()
        .unwrap()
        .iter()
        .find(|l| l.starts_with("  http://"))
        .map(|l| l.trim().to_string())
        .unwrap();
    let body = reqwest::get(&url).await.unwrap().bytes().await.unwrap();
    assert_eq!(body.len(), 4096);

    stop_tx.send(()).unwrap();
    let report = session.await.unwrap().unwrap();

    assert_eq!(report.pushes.len(), 1);
    assert!(!report.pushes[0].delivered);
    assert_eq!(report.pushes[0].attempts, 2);
    assert_eq!(report.batch_sent, 4096);

    let lines = lines.lock().unwrap();
    let attempts = lines
        .iter()
        .filter(|l| l.starts_with("URL PUSH attempt"))
        .count();
    assert_eq!(attempts, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn operator_resend_then_quit() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("game.3dsx"), b"HOMEBREW").unwrap();

    let (receiver_port, receiver) = one_shot_receiver().await;
    let (sinks, _events, lines) = recording_sinks();
    let mut config = loopback_config(receiver_port);
    config.send_on_start = false;
    let orchestrator = SessionOrchestrator::new(config, sinks);

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        orchestrator.run(
            dir.path(),
            Cursor::new(b"help\nR\nq\n".to_vec()),
            std::future::pending(),
        ),
    )
    .await
    .unwrap()
    .unwrap();

    let urls = receiver.await.unwrap();
    assert_eq!(urls, report.urls);
    assert_eq!(report.pushes.len(), 1);
    assert!(report.pushes[0].delivered);

    let lines = lines.lock().unwrap();
    assert!(lines.iter().any(|l| l == "URL PUSH: delivered (ACK received)"));
    let control: Vec<&str> = lines
        .iter()
        .filter(|l| l.starts_with("CONTROL | "))
        .map(String::as_str)
        .collect();
    assert_eq!(
        control,
        vec!["CONTROL | help", "CONTROL | resend", "CONTROL | quit"]
    );
    assert_eq!(lines.last().unwrap(), "STOP");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resolved_batch_reports_bound_port() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("game.cia"), vec![5u8; 2048]).unwrap();
    let batch = resolve_targets(dir.path()).unwrap().into_batch();

    let (sinks, _events, _lines) = recording_sinks();
    let mut config = loopback_config(closed_port());
    config.send_on_start = false;
    let orchestrator = Arc::new(SessionOrchestrator::new(config, sinks));
    assert_eq!(orchestrator.local_addr(), None);

    let mut state = orchestrator.state();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let session = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .run_batch(batch, Cursor::new(Vec::<u8>::new()), async {
                    let _ = stop_rx.await;
                })
                .await
        })
    };

    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == SessionState::Serving),
    )
    .await
    .unwrap()
    .unwrap();
    let bound = orchestrator.local_addr().unwrap();
    assert_ne!(bound.port(), 0);

    let url = format!("http://127.0.0.1:{}/game.cia", bound.port());
    let body = reqwest::get(&url).await.unwrap().bytes().await.unwrap();
    assert_eq!(body.len(), 2048);

    stop_tx.send(()).unwrap();
    let report = session.await.unwrap().unwrap();
    assert_eq!(report.urls, vec![url]);
    assert_eq!(report.batch_sent, 2048);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_abandons_push_in_progress() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("game.cia"), vec![7u8; 512]).unwrap();

    let (sinks, _events, lines) = recording_sinks();
    let mut config = loopback_config(closed_port());
    config.push.retries = 5;
    config.push.retry_delay = Duration::from_millis(500);
    let orchestrator = Arc::new(SessionOrchestrator::new(config, sinks));

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let path = dir.path().to_path_buf();
    let session = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .run(path, Cursor::new(Vec::<u8>::new()), async {
                    let _ = stop_rx.await;
                })
                .await
        })
    };

    // The push is now sleeping between attempts.
    wait_for_line(&lines, "URL PUSH attempt 1/5 failed").await;
    let stopped_at = Instant::now();
    stop_tx.send(()).unwrap();
    let report = session.await.unwrap().unwrap();
    assert!(stopped_at.elapsed() < Duration::from_millis(400));
    assert!(report.pushes.is_empty());

    let logged = lines.lock().unwrap().clone();
    assert_eq!(logged.last().unwrap(), "STOP");

    // Nothing from the abandoned push shows up later.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let lines = lines.lock().unwrap();
    assert_eq!(*lines, logged);
    assert!(!lines.iter().any(|l| l.starts_with("URL PUSH FAIL")));
    assert!(!lines.iter().any(|l| l.starts_with("URL PUSH attempt 2/5")));
}
