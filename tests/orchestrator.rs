use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use ffly_bench::encoder::MODE_DECLARATION;
use ffly_bench::{run, BenchError, Config, WorkerOutcome};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;

/// Accepts every connection and hands back everything received on it once
/// the client closes.
async fn sink() -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = socket.read_to_end(&mut buf).await;
                let _ = tx.send(String::from_utf8(buf).unwrap());
            });
        }
    });
    (addr, rx)
}

/// A port on which nothing listens.
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn config(port: u16, workers: usize, requests_per_worker: u64) -> Config {
    Config {
        workers,
        requests_per_worker,
        host: "127.0.0.1".to_string(),
        port,
        ..Default::default()
    }
}

async fn sessions(rx: &mut mpsc::UnboundedReceiver<String>, count: usize) -> Vec<String> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let session = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("sink did not see the connection close")
            .unwrap();
        out.push(session);
    }
    out
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn all_workers_deliver_their_quota() {
    let (addr, mut rx) = sink().await;

    let report = run(config(addr.port(), 10, 5)).await.unwrap();

    assert_eq!(report.intended, 50);
    assert_eq!(report.sent, 50);
    assert!(report.is_success());
    assert_eq!(report.worker_reports.len(), 10);
    assert!(report
        .worker_reports
        .iter()
        .all(|w| w.outcome == WorkerOutcome::Completed && w.sent == 5));
    assert!(report.elapsed > Duration::ZERO);
    let rate = report.client_send_rate.unwrap();
    assert!((rate - 50.0 / report.elapsed.as_secs_f64()).abs() < 1e-6);

    let mut ids = HashSet::new();
    for session in sessions(&mut rx, 10).await {
        let statements = session
            .strip_prefix(MODE_DECLARATION)
            .expect("mode declaration comes first");
        assert!(!statements.contains("QUERY TYPE"));

        let writes: Vec<_> = statements.split_terminator(';').collect();
        assert_eq!(writes.len(), 5);
        for write in writes {
            assert!(write.starts_with("NEW '"));
            assert!(write.contains("' VALUE 's2."));
            assert!(write.contains("' WITH TTL '"));
            let id = write[5..41].to_string();
            assert!(ids.insert(id));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn join_barrier_outlasts_every_worker() {
    let (addr, _rx) = sink().await;

    let report = run(config(addr.port(), 8, 200)).await.unwrap();

    assert!(report.elapsed >= report.max_worker_elapsed());
    for worker in &report.worker_reports {
        assert!(report.started_at <= worker.begin);
        assert!(worker.end <= report.finished_at);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_target_is_tallied_not_fatal() {
    let port = closed_port().await;

    let report = run(config(port, 1, 1)).await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.sent, 0);
    assert_eq!(report.intended, 1);
    assert!(!report.is_success());
    assert!(matches!(
        report.worker_reports[0].outcome,
        WorkerOutcome::ConnectionFailed(_)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_workers_is_rejected_before_connecting() {
    let (addr, mut rx) = sink().await;

    let err = run(config(addr.port(), 0, 5)).await.unwrap_err();
    assert!(matches!(err, BenchError::InvalidConfiguration(_)));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unresolvable_host_is_invalid_configuration() {
    let mut config = config(46600, 1, 1);
    config.host = "no-such-host.invalid".to_string();

    let err = run(config).await.unwrap_err();
    assert!(matches!(err, BenchError::InvalidConfiguration(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_requests_sends_only_the_mode_declaration() {
    let (addr, mut rx) = sink().await;

    let report = run(config(addr.port(), 3, 0)).await.unwrap();

    assert_eq!(report.sent, 0);
    assert_eq!(report.intended, 0);
    assert!(report.is_success());
    if let Some(rate) = report.client_send_rate {
        assert_eq!(rate, 0.0);
    }
    for session in sessions(&mut rx, 3).await {
        assert_eq!(session, MODE_DECLARATION);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deadline_cancels_blocked_workers() {
    // accepts but never reads, so writers stall once the socket buffers fill
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let hold = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let mut config = config(port, 2, 1_000_000);
    config.encoder.payload_length = 4096;
    config.deadline = Some(Duration::from_millis(300));

    let report = tokio::time::timeout(Duration::from_secs(10), run(config))
        .await
        .expect("run did not honour its deadline")
        .unwrap();
    hold.abort();

    assert_eq!(report.cancelled, 2);
    assert!(report.sent < report.intended);
    assert!(report.elapsed >= Duration::from_millis(300));
    assert_eq!(
        report.sent,
        report.worker_reports.iter().map(|w| w.sent).sum::<u64>()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn peer_reset_reports_partial_send() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });

    let mut config = config(port, 1, 100_000);
    config.encoder.payload_length = 1024;

    let report = run(config).await.unwrap();

    assert_eq!(report.partial, 1);
    assert!(report.sent < report.intended);
    assert!(matches!(
        report.worker_reports[0].outcome,
        WorkerOutcome::PartialSend(_)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn nodelay_sessions_deliver_their_quota() {
    let (addr, mut rx) = sink().await;

    let mut config = config(addr.port(), 4, 25);
    config.nodelay = true;
    let report = run(config).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.sent, 100);
    for session in sessions(&mut rx, 4).await {
        assert_eq!(session.matches("NEW '").count(), 25);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stalled_connect_times_out() {
    // a listener that never accepts stops completing handshakes once its
    // backlog is full
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listener = socket.listen(1).unwrap();
    let port = listener.local_addr().unwrap().port();
    let fillers: Vec<_> = (0..16)
        .map(|_| tokio::spawn(TcpStream::connect(("127.0.0.1", port))))
        .collect();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut config = config(port, 1, 1);
    config.connect_timeout = Some(Duration::from_millis(300));
    let report = tokio::time::timeout(Duration::from_secs(10), run(config))
        .await
        .expect("connect timeout was not applied")
        .unwrap();

    for filler in fillers {
        filler.abort();
    }
    drop(listener);

    assert_eq!(report.failed, 1);
    match &report.worker_reports[0].outcome {
        WorkerOutcome::ConnectionFailed(reason) => assert!(reason.contains("timed out")),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hostname_reaches_an_ipv4_only_listener() {
    let (addr, mut rx) = sink().await;

    let mut config = config(addr.port(), 2, 3);
    config.host = "localhost".to_string();
    let report = run(config).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.sent, 6);
    assert_eq!(sessions(&mut rx, 2).await.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unsafe_payload_tag_is_rejected_before_connecting() {
    let (addr, mut rx) = sink().await;

    let mut config = config(addr.port(), 1, 1);
    config.encoder.payload_tag = "é';DROP ".to_string();
    let err = run(config).await.unwrap_err();
    assert!(matches!(err, BenchError::InvalidConfiguration(_)));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
}
