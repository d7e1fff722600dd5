//! Core functionality for actual scanning behaviour.
//!
//! A [`Scanner`] owns a fixed pool of workers. Each worker loops over
//! gate check, claim, probe (with one slow retry on timeout), record and
//! report until the [`WorkCursor`] runs dry. The cursor, the [`PauseGate`]
//! and the [`ResultSet`] are the only shared mutable state.
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::classify::{Classification, Classifier};
use crate::error::ScanError;
use crate::progress::{ProgressReporter, Silent};
use crate::target::{ScanRequest, ScanTarget, TargetEnumerator};

mod cursor;
mod gate;
mod probe;
mod results;

pub use cursor::WorkCursor;
pub use gate::{GateState, PauseGate};
pub use probe::{ProbeOutcome, Prober, TcpProber};
pub(crate) use probe::elapsed_ms;
pub use results::{ResultSet, ScanEntry};

pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 200;
pub const DEFAULT_WORKERS: usize = 50;
pub const DEFAULT_FAST_TIMEOUT: Duration = Duration::from_millis(200);
pub const DEFAULT_SLOW_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_CLASSIFY_TIMEOUT: Duration = Duration::from_millis(2000);

/// Distinct transport errors kept for the debug summary.
const MAX_KEPT_ERRORS: usize = 1000;

/// Engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Running,
    Draining,
    Completed,
    Cancelled,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// What one call to [`Scanner::run`] produced.
#[derive(Debug)]
pub struct ScanReport {
    /// Open targets in discovery order.
    pub entries: Vec<ScanEntry>,
    pub total: u64,
    /// Offsets handed out by the cursor.
    pub next_offset: u64,
    /// Offsets whose probing finished. Equals `total` unless cancelled.
    pub completed: u64,
    pub phase: ScanPhase,
}

/// The scan engine.
///
/// `workers` is the number of concurrently running probes. Every target is
/// first probed with `fast_timeout`; a target that times out is probed once
/// more with `slow_timeout` and then given up on.
pub struct Scanner {
    enumerator: Arc<TargetEnumerator>,
    workers: usize,
    fast_timeout: Duration,
    slow_timeout: Duration,
    prober: Arc<dyn Prober>,
    classifier: Option<Arc<dyn Classifier>>,
    classify_timeout: Duration,
    reporter: Arc<dyn ProgressReporter>,
    gate: Arc<PauseGate>,
    phase: watch::Sender<ScanPhase>,
}

impl fmt::Debug for Scanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scanner")
            .field("request", self.enumerator.request())
            .field("workers", &self.workers)
            .field("fast_timeout", &self.fast_timeout)
            .field("slow_timeout", &self.slow_timeout)
            .field("classify", &self.classifier.is_some())
            .field("phase", &*self.phase.borrow())
            .finish_non_exhaustive()
    }
}

impl Scanner {
    /// Validates the request and the worker count. Nothing is spawned yet.
    ///
    /// ```rust
    /// # use mcscan::scanner::Scanner;
    /// # use mcscan::target::ScanRequest;
    /// # use std::time::Duration;
    /// let request = ScanRequest::range("127.0.0.1".parse().unwrap(), "127.0.0.1".parse().unwrap(), 1).unwrap();
    /// assert!(Scanner::new(request.clone(), 0, Duration::from_millis(200), Duration::from_secs(1)).is_err());
    /// assert!(Scanner::new(request, 50, Duration::from_millis(200), Duration::from_secs(1)).is_ok());
    /// ```
    pub fn new(
        request: ScanRequest,
        workers: usize,
        fast_timeout: Duration,
        slow_timeout: Duration,
    ) -> Result<Self, ScanError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&workers) {
            return Err(ScanError::InvalidRequest(format!(
                "worker count must be between {MIN_WORKERS} and {MAX_WORKERS}, got {workers}"
            )));
        }
        let enumerator = TargetEnumerator::new(request)?;
        let (phase, _) = watch::channel(ScanPhase::Idle);

        Ok(Self {
            enumerator: Arc::new(enumerator),
            workers,
            fast_timeout,
            slow_timeout,
            prober: Arc::new(TcpProber),
            classifier: None,
            classify_timeout: DEFAULT_CLASSIFY_TIMEOUT,
            reporter: Arc::new(Silent),
            gate: Arc::new(PauseGate::new()),
            phase,
        })
    }

    #[must_use]
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = prober;
        self
    }

    /// Enables classification of open targets.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>, timeout: Duration) -> Self {
        self.classifier = Some(classifier);
        self.classify_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.enumerator.size()
    }

    /// Number of workers `run` spawns.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// The gate every worker checks before claiming work. Use it to pause,
    /// resume or cancel a running scan from another task.
    #[must_use]
    pub fn gate(&self) -> Arc<PauseGate> {
        Arc::clone(&self.gate)
    }

    #[must_use]
    pub fn phase(&self) -> watch::Receiver<ScanPhase> {
        self.phase.subscribe()
    }

    /// Probes every target exactly once and returns the open ones.
    ///
    /// Blocks until all workers are done. Per-target failures never end the
    /// scan early; only cancellation through [`Scanner::gate`] does.
    pub async fn run(&self) -> ScanReport {
        let total = self.enumerator.size();
        let shared = Arc::new(Shared {
            enumerator: Arc::clone(&self.enumerator),
            cursor: WorkCursor::new(total),
            gate: Arc::clone(&self.gate),
            results: ResultSet::new(),
            prober: Arc::clone(&self.prober),
            classifier: self.classifier.clone(),
            classify_timeout: self.classify_timeout,
            fast_timeout: self.fast_timeout,
            slow_timeout: self.slow_timeout,
            reporter: Arc::clone(&self.reporter),
            completed: AtomicU64::new(0),
            errors: Mutex::new(HashSet::new()),
        });

        debug!(
            "Start scanning {}\nWorkers {}\nTargets all together {}",
            self.enumerator.request(),
            self.workers,
            total
        );

        self.phase.send_replace(ScanPhase::Running);
        let mut pool = JoinSet::new();
        for _ in 0..self.workers {
            let shared = Arc::clone(&shared);
            pool.spawn(async move { shared.work().await });
        }

        // The first worker to return means the cursor is dry or the scan was
        // cancelled; the rest are finishing their last probe.
        let mut draining = false;
        while let Some(joined) = pool.join_next().await {
            if !draining {
                draining = true;
                self.phase.send_replace(ScanPhase::Draining);
            }
            if let Err(e) = joined {
                warn!("Scan worker stopped abnormally: {e}");
            }
        }
        self.reporter.finish();

        {
            let errors = shared.errors.lock().unwrap_or_else(PoisonError::into_inner);
            debug!("Typical socket connection errors {errors:?}");
        }

        let completed = shared.completed.load(Ordering::Acquire);
        let phase = if self.gate.is_cancelled() && completed < total {
            ScanPhase::Cancelled
        } else {
            ScanPhase::Completed
        };
        self.phase.send_replace(phase);

        debug!("Open targets found: {}", shared.results.len());
        let entries = shared.results.to_ordered_list();
        ScanReport {
            entries,
            total,
            next_offset: shared.cursor.next_offset(),
            completed,
            phase,
        }
    }
}

/// State handed to every worker of one run.
struct Shared {
    enumerator: Arc<TargetEnumerator>,
    cursor: WorkCursor,
    gate: Arc<PauseGate>,
    results: ResultSet,
    prober: Arc<dyn Prober>,
    classifier: Option<Arc<dyn Classifier>>,
    classify_timeout: Duration,
    fast_timeout: Duration,
    slow_timeout: Duration,
    reporter: Arc<dyn ProgressReporter>,
    completed: AtomicU64,
    errors: Mutex<HashSet<String>>,
}

impl Shared {
    async fn work(&self) {
        loop {
            if self.gate.wait().await == GateState::Cancelled {
                debug!("Worker observed cancellation");
                return;
            }
            let Some(offset) = self.cursor.claim_next() else {
                return;
            };

            match self.enumerator.target_at(offset) {
                Ok(target) => {
                    let outcome = self.probe_with_retry(&target).await;
                    self.record(&target, outcome).await;
                    self.advance(&target.to_string());
                }
                Err(e) => {
                    warn!("Skipping offset {offset}: {e}");
                    self.advance(&format!("#{offset}"));
                }
            }
        }
    }

    /// Fast attempt, then exactly one slow attempt if the first timed out.
    async fn probe_with_retry(&self, target: &ScanTarget) -> ProbeOutcome {
        match self.prober.probe(target, self.fast_timeout).await {
            ProbeOutcome::TimedOut => {
                debug!("{target} timed out after {:?}, retrying once", self.fast_timeout);
                self.prober.probe(target, self.slow_timeout).await
            }
            outcome => outcome,
        }
    }

    async fn record(&self, target: &ScanTarget, outcome: ProbeOutcome) {
        match outcome {
            ProbeOutcome::Open { latency_ms } => {
                let classification = self.classify(target).await;
                let entry = ScanEntry::new(target.host, target.port, latency_ms, classification);
                if self.results.insert_if_absent(entry.clone()) {
                    self.reporter.found(&entry);
                }
            }
            ProbeOutcome::Closed | ProbeOutcome::TimedOut => {}
            ProbeOutcome::Error(reason) => {
                debug!("Probe of {target} failed: {reason}");
                let mut errors = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
                if errors.len() < MAX_KEPT_ERRORS {
                    errors.insert(reason);
                }
                drop(errors);
            }
        }
    }

    async fn classify(&self, target: &ScanTarget) -> Classification {
        let Some(classifier) = &self.classifier else {
            return Classification::Unclassified;
        };
        match classifier.classify(target, self.classify_timeout).await {
            Ok(status) => Classification::ApplicationServer(status),
            Err(e) => {
                debug!("{target} is open but not classified: {e}");
                Classification::Unclassified
            }
        }
    }

    fn advance(&self, label: &str) {
        self.completed.fetch_add(1, Ordering::AcqRel);
        self.reporter.advance(self.cursor.total(), label);
    }
}
