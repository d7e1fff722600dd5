//! Turns a scan request into an addressable, ordered sequence of targets.
//!
//! A [`TargetEnumerator`] never stores the targets it describes. Every target
//! is computed on demand from its offset, so the enumerator can be shared by
//! any number of workers without synchronisation.
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use cidr_utils::cidr::Ipv4Cidr;
use serde::Serialize;

use crate::error::ScanError;

/// One (host, port) pair to probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ScanTarget {
    pub host: IpAddr,
    pub port: u16,
}

impl ScanTarget {
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// What to scan. Built once from validated input and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanRequest {
    /// Every address from `start` to `end` inclusive, on one port.
    RangeScan {
        start: Ipv4Addr,
        end: Ipv4Addr,
        port: u16,
    },
    /// One host, every port from `start_port` to `end_port` inclusive.
    PortScan {
        host: IpAddr,
        start_port: u16,
        end_port: u16,
    },
}

impl ScanRequest {
    /// Builds a validated [`ScanRequest::RangeScan`].
    ///
    /// ```rust
    /// # use mcscan::target::ScanRequest;
    /// let request = ScanRequest::range("10.0.0.1".parse().unwrap(), "10.0.0.9".parse().unwrap(), 25565);
    /// assert!(request.is_ok());
    /// ```
    pub fn range(start: Ipv4Addr, end: Ipv4Addr, port: u16) -> Result<Self, ScanError> {
        let request = Self::RangeScan { start, end, port };
        request.validate()?;
        Ok(request)
    }

    /// Builds a validated [`ScanRequest::PortScan`].
    pub fn ports(host: IpAddr, start_port: u16, end_port: u16) -> Result<Self, ScanError> {
        let request = Self::PortScan {
            host,
            start_port,
            end_port,
        };
        request.validate()?;
        Ok(request)
    }

    /// Expands an IPv4 CIDR block into a range scan over all of its addresses.
    pub fn from_cidr(cidr: &str, port: u16) -> Result<Self, ScanError> {
        let cidr = Ipv4Cidr::from_str(cidr.trim())
            .map_err(|e| ScanError::InvalidRequest(format!("{cidr:?} is not an IPv4 CIDR: {e}")))?;
        Self::range(cidr.first_address(), cidr.last_address(), port)
    }

    /// Checks the ordering and port invariants of the request.
    pub fn validate(&self) -> Result<(), ScanError> {
        match *self {
            Self::RangeScan { start, end, port } => {
                if u32::from(start) > u32::from(end) {
                    return Err(ScanError::InvalidRequest(format!(
                        "start address {start} is greater than end address {end}"
                    )));
                }
                if port == 0 {
                    return Err(ScanError::InvalidRequest(
                        "port must be between 1 and 65535".to_owned(),
                    ));
                }
            }
            Self::PortScan {
                start_port,
                end_port,
                ..
            } => {
                if start_port == 0 {
                    return Err(ScanError::InvalidRequest(
                        "ports must be between 1 and 65535".to_owned(),
                    ));
                }
                if start_port > end_port {
                    return Err(ScanError::InvalidRequest(format!(
                        "start port {start_port} is greater than end port {end_port}"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for ScanRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RangeScan { start, end, port } => write!(f, "{start} -> {end} on port {port}"),
            Self::PortScan {
                host,
                start_port,
                end_port,
            } => write!(f, "{host} ports {start_port} -> {end_port}"),
        }
    }
}

/// Pure offset -> target mapping over one [`ScanRequest`].
#[derive(Debug, Clone)]
pub struct TargetEnumerator {
    request: ScanRequest,
    size: u64,
}

impl TargetEnumerator {
    pub fn new(request: ScanRequest) -> Result<Self, ScanError> {
        request.validate()?;
        let size = match request {
            ScanRequest::RangeScan { start, end, .. } => {
                u64::from(u32::from(end)) - u64::from(u32::from(start)) + 1
            }
            ScanRequest::PortScan {
                start_port,
                end_port,
                ..
            } => u64::from(end_port) - u64::from(start_port) + 1,
        };
        Ok(Self { request, size })
    }

    #[must_use]
    pub const fn request(&self) -> &ScanRequest {
        &self.request
    }

    /// Number of targets. Fixed for the lifetime of the enumerator.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Resolves `offset` to its target. Only `0..size()` is defined.
    pub fn target_at(&self, offset: u64) -> Result<ScanTarget, ScanError> {
        let out_of_range = || ScanError::OutOfRange {
            offset,
            size: self.size,
        };
        if offset >= self.size {
            return Err(out_of_range());
        }

        let target = match self.request {
            ScanRequest::RangeScan { start, port, .. } => {
                let addr = u32::try_from(offset)
                    .ok()
                    .and_then(|offset| u32::from(start).checked_add(offset))
                    .ok_or_else(out_of_range)?;
                ScanTarget {
                    host: IpAddr::V4(Ipv4Addr::from(addr)),
                    port,
                }
            }
            ScanRequest::PortScan {
                host, start_port, ..
            } => ScanTarget {
                host,
                port: u16::try_from(offset)
                    .ok()
                    .and_then(|offset| start_port.checked_add(offset))
                    .ok_or_else(out_of_range)?,
            },
        };
        Ok(target)
    }

    /// Walks every target in offset order.
    pub fn iter(&self) -> impl Iterator<Item = ScanTarget> + '_ {
        (0..self.size).filter_map(move |offset| self.target_at(offset).ok())
    }
}
