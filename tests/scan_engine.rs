use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mcscan::classify::{Classification, MinecraftClassifier};
use mcscan::progress::ProgressReporter;
use mcscan::scanner::{ProbeOutcome, Prober, ScanEntry, ScanPhase, Scanner};
use mcscan::target::{ScanRequest, ScanTarget};
use parameterized::parameterized;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const FAST: Duration = Duration::from_millis(200);
const SLOW: Duration = Duration::from_millis(1000);

/// Answers `Open` for the listed targets and `Closed` for everything else.
struct OpenOnly {
    open: HashSet<ScanTarget>,
    attempts: Mutex<Vec<ScanTarget>>,
}

impl OpenOnly {
    fn new(open: impl IntoIterator<Item = ScanTarget>) -> Self {
        Self {
            open: open.into_iter().collect(),
            attempts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Prober for OpenOnly {
    async fn probe(&self, target: &ScanTarget, _timeout: Duration) -> ProbeOutcome {
        self.attempts.lock().unwrap().push(target.clone());
        if self.open.contains(target) {
            ProbeOutcome::Open { latency_ms: 3 }
        } else {
            ProbeOutcome::Closed
        }
    }
}

#[derive(Default)]
struct Counter {
    advanced: AtomicU64,
    found: AtomicU64,
    labels: Mutex<Vec<String>>,
}

impl ProgressReporter for Counter {
    fn advance(&self, _total: u64, last_attempted: &str) {
        self.advanced.fetch_add(1, Ordering::SeqCst);
        self.labels.lock().unwrap().push(last_attempted.to_owned());
    }

    fn found(&self, _entry: &ScanEntry) {
        self.found.fetch_add(1, Ordering::SeqCst);
    }
}

fn target(ip: &str, port: u16) -> ScanTarget {
    ScanTarget {
        host: ip.parse().unwrap(),
        port,
    }
}

#[tokio::test]
async fn range_scan_finds_the_one_open_address() {
    let request = ScanRequest::range(
        Ipv4Addr::from(3_232_235_521),
        Ipv4Addr::from(3_232_235_523),
        80,
    )
    .unwrap();
    let prober = Arc::new(OpenOnly::new([target("192.168.0.2", 80)]));
    let counter = Arc::new(Counter::default());

    let report = Scanner::new(request, 4, FAST, SLOW)
        .unwrap()
        .with_prober(prober.clone())
        .with_reporter(counter.clone())
        .run()
        .await;

    assert_eq!(report.entries.len(), 1);
    let entry = &report.entries[0];
    assert_eq!(entry.host, IpAddr::V4(Ipv4Addr::new(192, 168, 0, 2)));
    assert_eq!(entry.port, 80);
    assert_eq!(entry.classification, Classification::Unclassified);
    assert_eq!(counter.advanced.load(Ordering::SeqCst), 3);
    assert_eq!(counter.found.load(Ordering::SeqCst), 1);
    assert_eq!(report.next_offset, 3);
    assert_eq!(report.phase, ScanPhase::Completed);
    assert_eq!(prober.attempts.lock().unwrap().len(), 3);

    let mut labels = counter.labels.lock().unwrap().clone();
    labels.sort();
    assert_eq!(labels, ["192.168.0.1:80", "192.168.0.2:80", "192.168.0.3:80"]);
}

#[parameterized(workers = { 1, 2, 13, 50, 199, 200 })]
fn every_worker_count_probes_each_target_once(workers: usize) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let request = ScanRequest::ports("10.1.1.1".parse().unwrap(), 1000, 1299).unwrap();
        let prober = Arc::new(OpenOnly::new((1000..1300).step_by(50).map(|p| target("10.1.1.1", p))));
        let counter = Arc::new(Counter::default());

        let report = Scanner::new(request, workers, FAST, SLOW)
            .unwrap()
            .with_prober(prober.clone())
            .with_reporter(counter.clone())
            .run()
            .await;

        assert_eq!(counter.advanced.load(Ordering::SeqCst), 300);
        assert_eq!(report.next_offset, 300);
        assert_eq!(report.completed, 300);
        assert_eq!(report.entries.len(), 6);

        let attempts = prober.attempts.lock().unwrap();
        let distinct: HashSet<_> = attempts.iter().collect();
        assert_eq!(attempts.len(), 300);
        assert_eq!(distinct.len(), 300);
    });
}

#[tokio::test]
async fn invalid_requests_never_start() {
    assert!(ScanRequest::range("10.0.0.9".parse().unwrap(), "10.0.0.1".parse().unwrap(), 80).is_err());
    assert!(ScanRequest::ports("10.0.0.1".parse().unwrap(), 0, 10).is_err());

    let request = ScanRequest::ports("10.0.0.1".parse().unwrap(), 1, 10).unwrap();
    assert!(Scanner::new(request.clone(), 0, FAST, SLOW).is_err());
    assert!(Scanner::new(request, 201, FAST, SLOW).is_err());
}

#[tokio::test]
async fn loopback_port_scan_reports_listeners() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            if listener.accept().await.is_err() {
                break;
            }
        }
    });

    let request = ScanRequest::ports(IpAddr::V4(Ipv4Addr::LOCALHOST), port, port).unwrap();
    let report = Scanner::new(request, 1, FAST, SLOW).unwrap().run().await;

    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].port, port);
}

/// Writes one Server List Ping response to every connection.
async fn fake_java_server(document: &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 256];
                let _ = stream.read(&mut buf).await;

                let json = document.as_bytes();
                let mut payload = vec![0x00];
                push_varint(&mut payload, json.len());
                payload.extend_from_slice(json);
                let mut frame = Vec::new();
                push_varint(&mut frame, payload.len());
                frame.extend_from_slice(&payload);
                let _ = stream.write_all(&frame).await;
            });
        }
    });
    port
}

fn push_varint(buf: &mut Vec<u8>, mut value: usize) {
    loop {
        let byte = value.to_le_bytes()[0] & 0x7f;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

#[tokio::test]
async fn classification_identifies_a_java_server() {
    let port = fake_java_server(
        r#"{"version":{"name":"1.20.4","protocol":765},"players":{"online":3,"max":20},"description":{"text":"§aHello"}}"#,
    )
    .await;

    let request = ScanRequest::ports(IpAddr::V4(Ipv4Addr::LOCALHOST), port, port).unwrap();
    let report = Scanner::new(request, 2, FAST, SLOW)
        .unwrap()
        .with_classifier(Arc::new(MinecraftClassifier::new()), Duration::from_secs(2))
        .run()
        .await;

    assert_eq!(report.entries.len(), 1);
    let status = report.entries[0].classification.status().unwrap();
    assert_eq!(status.version, "1.20.4");
    assert_eq!(status.players(), "3/20");
    assert_eq!(status.motd, "Hello");
}

#[tokio::test]
async fn cancelled_scan_stops_early() {
    let request = ScanRequest::ports("10.1.1.1".parse().unwrap(), 1, 5000).unwrap();
    let scanner = Scanner::new(request, 3, FAST, SLOW)
        .unwrap()
        .with_prober(Arc::new(OpenOnly::new([])));
    scanner.gate().cancel();

    let report = scanner.run().await;

    assert_eq!(report.phase, ScanPhase::Cancelled);
    assert!(report.completed < 5000);
}
