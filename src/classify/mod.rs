//! Application-layer classification of open ports.
//!
//! After a TCP connect succeeds the engine may ask a [`Classifier`] whether
//! the target is a Minecraft server. [`MinecraftClassifier`] tries the Java
//! Edition status ping first and falls back to the Bedrock Edition
//! unconnected ping. Any failure is reported as a [`ClassifyError`] and the
//! engine records the target as [`Classification::Unclassified`].
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::Serialize;

use crate::error::ClassifyError;
use crate::target::ScanTarget;

pub mod bedrock;
pub mod java;

pub use bedrock::BedrockStatus;
pub use java::JavaStatus;

/// Which edition answered the status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    Java,
    Bedrock,
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Java => f.write_str("Java"),
            Self::Bedrock => f.write_str("Bedrock"),
        }
    }
}

/// A successful status query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerStatus {
    pub kind: ServerKind,
    pub version: String,
    pub protocol: Option<i64>,
    pub players_online: i64,
    pub players_max: i64,
    pub motd: String,
    pub latency_ms: u64,
    /// Edition-specific fields: mod lists, map name, game mode, favicon presence.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ServerStatus {
    #[must_use]
    pub fn players(&self) -> String {
        format!("{}/{}", self.players_online, self.players_max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Classification {
    Unclassified,
    ApplicationServer(ServerStatus),
}

impl Classification {
    #[must_use]
    pub const fn is_server(&self) -> bool {
        matches!(self, Self::ApplicationServer(_))
    }

    #[must_use]
    pub const fn status(&self) -> Option<&ServerStatus> {
        match self {
            Self::ApplicationServer(status) => Some(status),
            Self::Unclassified => None,
        }
    }
}

/// Identifies what protocol an open target speaks.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        target: &ScanTarget,
        timeout: Duration,
    ) -> Result<ServerStatus, ClassifyError>;
}

/// Java Edition first, then Bedrock Edition.
#[derive(Debug, Default, Clone, Copy)]
pub struct MinecraftClassifier {
    java: JavaStatus,
    bedrock: BedrockStatus,
}

impl MinecraftClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Classifier for MinecraftClassifier {
    async fn classify(
        &self,
        target: &ScanTarget,
        timeout: Duration,
    ) -> Result<ServerStatus, ClassifyError> {
        match self.java.classify(target, timeout).await {
            Ok(status) => Ok(status),
            Err(e) => {
                debug!("Java status query to {target} failed: {e}");
                self.bedrock.classify(target, timeout).await
            }
        }
    }
}

/// Strips `§x` formatting codes from a MOTD.
pub(crate) fn strip_formatting(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '§' {
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}
