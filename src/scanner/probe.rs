use std::io;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};

use crate::target::ScanTarget;

/// Result of a single connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The connection was accepted after `latency_ms`.
    Open { latency_ms: u64 },
    /// The peer actively refused or reset the connection.
    Closed,
    /// No answer within the timeout.
    TimedOut,
    /// Any other transport failure.
    Error(String),
}

/// Attempts one connection to one target.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: &ScanTarget, timeout: Duration) -> ProbeOutcome;
}

/// Plain TCP connect probe.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProber;

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, target: &ScanTarget, timeout: Duration) -> ProbeOutcome {
        let started = Instant::now();
        match time::timeout(timeout, TcpStream::connect(target.socket_addr())).await {
            Ok(Ok(tcp_stream)) => {
                let latency_ms = elapsed_ms(started);
                debug!("Connection was successful, shutting down stream {target}");
                if let Err(e) = { tcp_stream }.shutdown().await {
                    debug!("Shutdown stream error {e}");
                }
                ProbeOutcome::Open { latency_ms }
            }
            Ok(Err(e)) => outcome_from_error(&e),
            Err(_) => ProbeOutcome::TimedOut,
        }
    }
}

/// Milliseconds since `started`, saturating.
pub fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn outcome_from_error(e: &io::Error) -> ProbeOutcome {
    match e.kind() {
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => ProbeOutcome::Closed,
        io::ErrorKind::TimedOut => ProbeOutcome::TimedOut,
        _ => {
            let error_string = e.to_string();
            if error_string.to_lowercase().contains("too many open files") {
                warn!("Too many open files. Please reduce the number of workers or raise the ulimit.");
            }
            ProbeOutcome::Error(error_string)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn target_of(addr: std::net::SocketAddr) -> ScanTarget {
        ScanTarget {
            host: addr.ip(),
            port: addr.port(),
        }
    }

    #[tokio::test]
    async fn listening_port_is_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = target_of(listener.local_addr().unwrap());
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let outcome = TcpProber.probe(&target, Duration::from_secs(2)).await;
        assert!(matches!(outcome, ProbeOutcome::Open { .. }), "{outcome:?}");
        accept.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn refused_port_is_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = target_of(listener.local_addr().unwrap());
        drop(listener);

        let outcome = TcpProber.probe(&target, Duration::from_secs(2)).await;
        assert_eq!(outcome, ProbeOutcome::Closed);
    }

    #[test]
    fn io_errors_map_to_outcomes() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(outcome_from_error(&refused), ProbeOutcome::Closed);

        let timed_out = io::Error::from(io::ErrorKind::TimedOut);
        assert_eq!(outcome_from_error(&timed_out), ProbeOutcome::TimedOut);

        let unreachable = io::Error::other("network unreachable");
        assert!(matches!(
            outcome_from_error(&unreachable),
            ProbeOutcome::Error(reason) if reason.contains("unreachable")
        ));
    }
}
