//! This crate exposes the internal functionality of the mcscan
//! reachability scanner.
//!
//! mcscan walks a contiguous range of IPv4 addresses on one port, or a
//! contiguous range of ports on one host, with a bounded pool of concurrent
//! workers. Every open target it finds can optionally be asked whether it is
//! a Minecraft server (Java Edition or Bedrock Edition).
//!
//! ## Architecture Overview
//!
//! The core scanning behaviour is managed by
//! [`Scanner`](crate::scanner::Scanner), which maps offsets handed out by a
//! shared [`WorkCursor`](crate::scanner::WorkCursor) to targets through a
//! [`TargetEnumerator`](crate::target::TargetEnumerator):
//!
//! 1. **Input Processing**: a [`ScanRequest`](crate::target::ScanRequest) is validated
//! 2. **Work Distribution**: workers claim offsets until the cursor runs dry
//! 3. **Probing**: a fast connect attempt, then one slow retry on timeout
//! 4. **Classification**: optional status queries against open targets
//! 5. **Result Processing**: open targets are kept once each, in discovery order
//!
//! ## Basic Usage Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use mcscan::scanner::Scanner;
//! use mcscan::target::ScanRequest;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let request = ScanRequest::range("127.0.0.1".parse()?, "127.0.0.1".parse()?, 1)?;
//!
//!     let scanner = Scanner::new(
//!         request,
//!         10,                          // Concurrent workers
//!         Duration::from_millis(100),  // First attempt timeout
//!         Duration::from_millis(300),  // Retry timeout
//!     )?;
//!
//!     let runtime = tokio::runtime::Runtime::new()?;
//!     let report = runtime.block_on(scanner.run());
//!
//!     assert_eq!(report.completed, report.total);
//!     for entry in &report.entries {
//!         println!("{}:{} answered in {}ms", entry.host, entry.port, entry.latency_ms);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Classifying servers
//!
//! ```rust,no_run
//! # use std::{sync::Arc, time::Duration};
//! # use mcscan::classify::MinecraftClassifier;
//! # use mcscan::scanner::Scanner;
//! # use mcscan::target::ScanRequest;
//! let request = ScanRequest::from_cidr("192.168.0.0/24", 25565).unwrap();
//! let scanner = Scanner::new(request, 50, Duration::from_millis(200), Duration::from_secs(1))
//!     .unwrap()
//!     .with_classifier(Arc::new(MinecraftClassifier::new()), Duration::from_secs(2));
//! ```
#![allow(clippy::needless_doctest_main)]

pub mod tui;

pub mod input;

pub mod target;

pub mod scanner;

pub mod classify;

pub mod progress;

pub mod report;

pub mod benchmark;

pub mod address;

pub mod error;
