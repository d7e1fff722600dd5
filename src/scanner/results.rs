use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::classify::Classification;

/// One confirmed-open target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanEntry {
    pub host: IpAddr,
    pub port: u16,
    pub latency_ms: u64,
    pub classification: Classification,
    pub discovered_at: DateTime<Local>,
}

impl ScanEntry {
    #[must_use]
    pub fn new(host: IpAddr, port: u16, latency_ms: u64, classification: Classification) -> Self {
        Self {
            host,
            port,
            latency_ms,
            classification,
            discovered_at: Local::now(),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    keys: HashSet<(IpAddr, u16)>,
    entries: Vec<ScanEntry>,
}

/// Deduplicated, insertion-ordered collection of open targets keyed by
/// `(host, port)`.
///
/// Insertion order is completion order, not address order.
#[derive(Debug, Default)]
pub struct ResultSet {
    inner: Mutex<Inner>,
}

impl ResultSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entry` unless its key is already present.
    /// Returns `true` when the entry was inserted.
    pub fn insert_if_absent(&self, entry: ScanEntry) -> bool {
        let mut inner = self.lock();
        if !inner.keys.insert((entry.host, entry.port)) {
            return false;
        }
        inner.entries.push(entry);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in discovery order. Only meaningful once the scan has finished.
    #[must_use]
    pub fn to_ordered_list(&self) -> Vec<ScanEntry> {
        self.lock().entries.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
