//! Provides functions to resolve the host of a port scan or status check.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use hickory_resolver::{
    config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts},
    TokioAsyncResolver,
};
use itertools::Itertools;
use log::debug;
use tokio::{fs, io};

use crate::error::ScanError;

/// Resolves `host` to a single address, preferring IPv4.
///
/// Literal addresses are returned as they are. Names go to the system
/// resolver first and then to the backup resolver built from `resolver`.
///
/// ```rust
/// # use mcscan::address::resolve_host;
/// # tokio_test_block_on(async {
/// let ip = resolve_host("127.0.0.1", None).await.unwrap();
/// assert_eq!(ip.to_string(), "127.0.0.1");
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
pub async fn resolve_host(host: &str, resolver: Option<&str>) -> Result<IpAddr, ScanError> {
    let host = host.trim().trim_end_matches('.');
    if let Ok(ip) = IpAddr::from_str(host) {
        return Ok(ip);
    }

    let candidates = match tokio::net::lookup_host((host, 80)).await {
        Ok(addrs) => addrs.map(|x| x.ip()).collect_vec(),
        Err(e) => {
            debug!("System lookup of {host} failed: {e}");
            let backup_resolver = get_resolver(resolver).await;
            match backup_resolver.lookup_ip(host).await {
                Ok(addrs) => addrs.iter().collect_vec(),
                Err(e) => {
                    debug!("Backup lookup of {host} failed: {e}");
                    Vec::new()
                }
            }
        }
    };

    candidates
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| ScanError::Resolve {
            host: host.to_owned(),
        })
}

/// Splits `host[:port]`.
///
/// A missing port yields `default_port`. An unparsable or zero port also
/// yields `default_port`, and the returned flag is `true` so the caller can
/// warn about it.
#[must_use]
pub fn split_host_port(input: &str, default_port: u16) -> (String, u16, bool) {
    let input = input.trim();
    match input.rsplit_once(':') {
        // A bare IPv6 literal carries colons of its own.
        Some(_) if IpAddr::from_str(input).is_ok() => (input.to_owned(), default_port, false),
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) if port != 0 => (host.trim_matches(&['[', ']'][..]).to_owned(), port, false),
            _ => (host.trim_matches(&['[', ']'][..]).to_owned(), default_port, true),
        },
        None => (input.to_owned(), default_port, false),
    }
}

/// Derive a DNS resolver.
///
/// 1. if the `resolver` parameter has been set:
///     1. assume the parameter is a path and attempt to read IPs.
///     2. parse the input as a comma-separated list of IPs.
/// 2. if `resolver` is not set:
///    1. attempt to derive a resolver from the system config. (e.g.
///       `/etc/resolv.conf` on *nix).
///    2. finally, build a CloudFlare-based resolver (default
///       behaviour).
async fn get_resolver(resolver: Option<&str>) -> TokioAsyncResolver {
    match resolver {
        Some(r) => {
            let mut config = ResolverConfig::new();
            let resolver_ips = match read_resolver_from_file(r).await {
                Ok(ips) => ips,
                Err(_) => r
                    .split(',')
                    .filter_map(|r| IpAddr::from_str(r.trim()).ok())
                    .collect::<Vec<_>>(),
            };
            for ip in resolver_ips {
                config.add_name_server(NameServerConfig::new(
                    SocketAddr::new(ip, 53),
                    Protocol::Udp,
                ));
            }
            TokioAsyncResolver::tokio(config, ResolverOpts::default())
        }
        None => TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|_| {
            TokioAsyncResolver::tokio(ResolverConfig::cloudflare_tls(), ResolverOpts::default())
        }),
    }
}

/// Parses an input file of IPs for use in DNS resolution.
async fn read_resolver_from_file(path: &str) -> io::Result<Vec<IpAddr>> {
    let ips = fs::read_to_string(path)
        .await?
        .lines()
        .filter_map(|line| IpAddr::from_str(line.trim()).ok())
        .collect();

    Ok(ips)
}
