#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::doc_markdown, clippy::if_not_else, clippy::non_ascii_literal)]

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use mcscan::address::{resolve_host, split_host_port};
use mcscan::benchmark::{Benchmark, NamedTimer};
use mcscan::classify::{Classifier, MinecraftClassifier, ServerStatus};
use mcscan::input::{range_request, Command, Config, Opts, DEFAULT_PORT};
use mcscan::progress::{ProgressReporter, Silent, TerminalProgress};
use mcscan::report;
use mcscan::scanner::{ProbeOutcome, Prober, ScanPhase, Scanner, TcpProber, MIN_WORKERS};
use mcscan::target::{ScanRequest, ScanTarget};
use mcscan::{detail, opening, output, warning};

#[cfg(unix)]
const DEFAULT_FILE_DESCRIPTORS_LIMIT: u64 = 8000;
/// Descriptors kept free for stdio, the resolver and the runtime.
#[cfg(unix)]
const RESERVED_FILE_DESCRIPTORS: u64 = 100;

#[cfg(not(tarpaulin_include))]
#[tokio::main]
/// Reads the command line, then scans or queries.
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let mut benchmark = Benchmark::init();
    let mut total_timer = NamedTimer::start("mcscan");

    let mut opts: Opts = Opts::read();
    let config = Config::read(opts.config_path.clone())?;
    opts.merge(&config);

    debug!("Main() `opts` arguments are {opts:?}");

    let quiet = opts.greppable || opts.json;
    if !quiet && !opts.accessible && !opts.no_banner {
        opening!();
    }

    #[cfg(unix)]
    let workers = infer_workers(&opts, adjust_ulimit_size(&opts));
    #[cfg(not(unix))]
    let workers = opts.workers;

    match opts.command.clone() {
        Command::Range { start, end, port } => {
            let request = range_request(&start, end.as_deref(), port)?;
            scan(&opts, request, workers, &mut benchmark).await?;
        }
        Command::Ports {
            host,
            start_port,
            end_port,
        } => {
            let ip = resolve_host(&host, opts.resolver.as_deref()).await?;
            if ip.to_string() != host {
                detail!(format!("{host} resolved to {ip}"), quiet, opts.accessible);
            }
            let request = ScanRequest::ports(ip, start_port, end_port)?;
            scan(&opts, request, workers, &mut benchmark).await?;
        }
        Command::Status { address } => status(&opts, &address).await?,
    }

    total_timer.end();
    benchmark.push(total_timer);
    debug!("Benchmarks raw {benchmark:?}");
    debug!("{}", benchmark.summary());

    Ok(())
}

#[cfg(not(tarpaulin_include))]
async fn scan(
    opts: &Opts,
    request: ScanRequest,
    workers: usize,
    benchmark: &mut Benchmark,
) -> anyhow::Result<()> {
    let quiet = opts.greppable || opts.json;
    let mut scanner = Scanner::new(request.clone(), workers, opts.fast_timeout(), opts.slow_timeout())?;

    detail!(
        format!(
            "Scanning {request} ({} targets) with {} workers",
            scanner.total(),
            scanner.workers()
        ),
        quiet,
        opts.accessible
    );

    let reporter: Arc<dyn ProgressReporter> = if quiet {
        Arc::new(Silent)
    } else {
        Arc::new(TerminalProgress::new(scanner.total(), opts.accessible))
    };
    scanner = scanner.with_reporter(reporter);
    if opts.classify {
        scanner = scanner.with_classifier(Arc::new(MinecraftClassifier::new()), opts.classify_timeout());
    }

    let gate = scanner.gate();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            gate.cancel();
        }
    });

    let mut scan_timer = NamedTimer::start("Scan");
    let report = scanner.run().await;
    scan_timer.end();
    benchmark.push(scan_timer);
    interrupt.abort();

    debug!(
        "Scan finished in phase {}: {} of {} targets completed",
        report.phase, report.completed, report.total
    );
    if report.phase == ScanPhase::Cancelled {
        warning!(
            format!(
                "Scan cancelled after {} of {} targets.",
                report.completed, report.total
            ),
            quiet,
            opts.accessible
        );
    }

    if opts.json {
        println!("{}", report::to_json(&report.entries)?);
    } else if opts.greppable {
        if !report.entries.is_empty() {
            println!("{}", report::greppable(&report.entries));
        }
    } else if report.entries.is_empty() {
        warning!("No open targets found.", quiet, opts.accessible);
    } else {
        let servers = report
            .entries
            .iter()
            .filter(|e| e.classification.is_server())
            .count();
        let summary = if opts.classify {
            format!(
                "{} open of {} scanned, {servers} Minecraft server(s)",
                report.entries.len(),
                report.total
            )
        } else {
            format!("{} open of {} scanned", report.entries.len(), report.total)
        };
        output!(summary, quiet, opts.accessible);
        println!("{}", report::results_table(&report.entries, opts.accessible));
    }

    Ok(())
}

#[cfg(not(tarpaulin_include))]
async fn status(opts: &Opts, address: &str) -> anyhow::Result<()> {
    let quiet = opts.greppable || opts.json;
    let (host, port, bad_port) = split_host_port(address, DEFAULT_PORT);
    if bad_port {
        warning!(
            format!("Invalid port in '{address}', using {DEFAULT_PORT}."),
            quiet,
            opts.accessible
        );
    }

    let ip = resolve_host(&host, opts.resolver.as_deref()).await?;
    let target = ScanTarget { host: ip, port };

    let (status, connect_latency) = query_status(&target, opts.classify_timeout()).await;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else if opts.greppable {
        if status.is_some() {
            println!("{}", target.socket_addr());
        }
    } else {
        println!(
            "{}",
            report::status_details(&target, &host, status.as_ref(), connect_latency)
        );
    }

    Ok(())
}

/// The server status, or failing that the latency of a plain connect, so an
/// open port can be told from an unreachable one. Both share `timeout`.
async fn query_status(target: &ScanTarget, timeout: Duration) -> (Option<ServerStatus>, Option<u64>) {
    let status = MinecraftClassifier::new()
        .classify(target, timeout)
        .await
        .inspect_err(|e| debug!("Status query to {target} failed: {e}"))
        .ok();
    if status.is_some() {
        return (status, None);
    }

    match TcpProber.probe(target, timeout).await {
        ProbeOutcome::Open { latency_ms } => (None, Some(latency_ms)),
        _ => (None, None),
    }
}

#[cfg(unix)]
fn adjust_ulimit_size(opts: &Opts) -> u64 {
    use rlimit::Resource;

    if let Some(limit) = opts.ulimit {
        if Resource::NOFILE.set(limit, limit).is_ok() {
            detail!(
                format!("Automatically increasing ulimit value to {limit}."),
                opts.greppable || opts.json,
                opts.accessible
            );
        } else {
            warning!(
                "ERROR. Failed to set ulimit value.",
                opts.greppable || opts.json,
                opts.accessible
            );
        }
    }

    let (soft, _) = Resource::NOFILE
        .get()
        .unwrap_or((DEFAULT_FILE_DESCRIPTORS_LIMIT, DEFAULT_FILE_DESCRIPTORS_LIMIT));
    soft
}

/// Each worker holds at most one socket at a time.
#[cfg(unix)]
fn infer_workers(opts: &Opts, ulimit: u64) -> usize {
    let available = ulimit.saturating_sub(RESERVED_FILE_DESCRIPTORS);
    let requested = u64::try_from(opts.workers).unwrap_or(u64::MAX);
    if requested <= available {
        return opts.workers;
    }

    let lowered = usize::try_from(available)
        .unwrap_or(MIN_WORKERS)
        .max(MIN_WORKERS);
    warning!(
        format!(
            "File limit {ulimit} is too low for {} workers, lowering to {lowered}. Raise it with --ulimit.",
            opts.workers
        ),
        opts.greppable || opts.json,
        opts.accessible
    );
    lowered
}
