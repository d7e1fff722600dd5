//! Bedrock Edition status over a RakNet unconnected ping.
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::net::UdpSocket;
use tokio::time::{self, Instant};

use super::{strip_formatting, Classifier, ServerKind, ServerStatus};
use crate::error::ClassifyError;
use crate::scanner::elapsed_ms;
use crate::target::ScanTarget;

const UNCONNECTED_PING: u8 = 0x01;
const UNCONNECTED_PONG: u8 = 0x1c;
const OFFLINE_MAGIC: [u8; 16] = [
    0x00, 0xff, 0xff, 0x00, 0xfe, 0xfe, 0xfe, 0xfe, 0xfd, 0xfd, 0xfd, 0xfd, 0x12, 0x34, 0x56, 0x78,
];
// id + time + server guid + magic + string length
const PONG_HEADER_LEN: usize = 1 + 8 + 8 + 16 + 2;

#[derive(Debug, Default, Clone, Copy)]
pub struct BedrockStatus;

#[async_trait]
impl Classifier for BedrockStatus {
    async fn classify(
        &self,
        target: &ScanTarget,
        timeout: Duration,
    ) -> Result<ServerStatus, ClassifyError> {
        time::timeout(timeout, exchange(target.socket_addr())).await?
    }
}

async fn exchange(addr: SocketAddr) -> Result<ServerStatus, ClassifyError> {
    let local: SocketAddr = match addr {
        SocketAddr::V4(_) => (std::net::Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(addr).await?;

    let started = Instant::now();
    socket
        .send(&ping_packet(chrono::Utc::now().timestamp_millis(), rand::random()))
        .await?;

    let mut buf = [0u8; 2048];
    let size = socket.recv(&mut buf).await?;
    let latency_ms = elapsed_ms(started);
    parse_pong(&buf[..size], latency_ms)
}

pub(crate) fn ping_packet(timestamp: i64, client_guid: i64) -> Vec<u8> {
    let mut packet = Vec::with_capacity(33);
    packet.push(UNCONNECTED_PING);
    packet.extend_from_slice(&timestamp.to_be_bytes());
    packet.extend_from_slice(&OFFLINE_MAGIC);
    packet.extend_from_slice(&client_guid.to_be_bytes());
    packet
}

/// Decodes an unconnected pong whose payload reads
/// `MCPE;motd;protocol;version;online;max;server id;sub motd;game mode;...`.
pub(crate) fn parse_pong(data: &[u8], latency_ms: u64) -> Result<ServerStatus, ClassifyError> {
    if data.len() < PONG_HEADER_LEN || data[0] != UNCONNECTED_PONG {
        return Err(ClassifyError::Protocol("not an unconnected pong".to_owned()));
    }
    if data[17..33] != OFFLINE_MAGIC {
        return Err(ClassifyError::Protocol("offline magic mismatch".to_owned()));
    }
    let len = usize::from(u16::from_be_bytes([data[33], data[34]]));
    let payload = data
        .get(PONG_HEADER_LEN..PONG_HEADER_LEN + len)
        .ok_or_else(|| ClassifyError::Protocol("server id string is truncated".to_owned()))?;
    let payload = String::from_utf8_lossy(payload);

    let fields: Vec<&str> = payload.split(';').collect();
    if fields.len() < 6 {
        return Err(ClassifyError::Protocol(format!(
            "server id has {} fields, expected at least 6",
            fields.len()
        )));
    }
    let number = |index: usize| -> Result<i64, ClassifyError> {
        fields[index]
            .trim()
            .parse()
            .map_err(|_| ClassifyError::Protocol(format!("field {index} is not a number")))
    };

    let mut extra = BTreeMap::new();
    extra.insert("edition".to_owned(), Value::String(fields[0].to_owned()));
    for (index, key) in [(6, "server_id"), (7, "map"), (8, "gamemode")] {
        if let Some(value) = fields.get(index).filter(|v| !v.is_empty()) {
            extra.insert(key.to_owned(), Value::String((*value).to_owned()));
        }
    }

    Ok(ServerStatus {
        kind: ServerKind::Bedrock,
        version: format!("Bedrock {}", fields[3]),
        protocol: fields[2].trim().parse().ok(),
        players_online: number(4)?,
        players_max: number(5)?,
        motd: strip_formatting(fields[1]),
        latency_ms,
        extra,
    })
}
