//! Java Edition Server List Ping.
//!
//! The exchange is a handshake packet announcing the status intent, an empty
//! status request, and a single response frame carrying a JSON document.
//! Every packet is framed as `VarInt length | VarInt packet id | payload`.
use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_derive::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};

use super::{strip_formatting, Classifier, ServerKind, ServerStatus};
use crate::error::ClassifyError;
use crate::scanner::elapsed_ms;
use crate::target::ScanTarget;

const PROTOCOL_VERSION: i32 = 47;
const NEXT_STATE_STATUS: i32 = 1;
const STATUS_PACKET_ID: i32 = 0x00;
/// Status documents with large favicons stay well under this.
const MAX_FRAME_LEN: usize = 2 * 1024 * 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct JavaStatus;

#[async_trait]
impl Classifier for JavaStatus {
    async fn classify(
        &self,
        target: &ScanTarget,
        timeout: Duration,
    ) -> Result<ServerStatus, ClassifyError> {
        time::timeout(timeout, exchange(target)).await?
    }
}

async fn exchange(target: &ScanTarget) -> Result<ServerStatus, ClassifyError> {
    let mut stream = TcpStream::connect(target.socket_addr()).await?;

    let mut status_request = Vec::with_capacity(1);
    encode_varint(&mut status_request, STATUS_PACKET_ID);
    let mut request = handshake(&target.host.to_string(), target.port);
    request.extend(frame(&status_request));

    let started = Instant::now();
    stream.write_all(&request).await?;
    let body = read_frame(&mut stream).await?;
    let latency_ms = elapsed_ms(started);

    let mut body = body.as_slice();
    let packet_id = decode_varint(&mut body)?;
    if packet_id != STATUS_PACKET_ID {
        return Err(ClassifyError::Protocol(format!(
            "expected status response, got packet {packet_id:#x}"
        )));
    }
    let document = decode_string(&mut body)?;
    parse_status(&document, latency_ms)
}

/// VarInts carry the two's complement bits of an `i32`.
pub(crate) fn encode_varint(buf: &mut Vec<u8>, value: i32) {
    let mut value = u32::from_ne_bytes(value.to_ne_bytes());
    loop {
        let low = value.to_le_bytes()[0] & 0x7f;
        value >>= 7;
        if value == 0 {
            buf.push(low);
            return;
        }
        buf.push(low | 0x80);
    }
}

pub(crate) fn decode_varint(buf: &mut &[u8]) -> Result<i32, ClassifyError> {
    let mut value = 0u32;
    for shift in (0..35).step_by(7) {
        let Some((&byte, rest)) = buf.split_first() else {
            return Err(ClassifyError::Protocol("truncated VarInt".to_owned()));
        };
        *buf = rest;
        value |= u32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(i32::from_ne_bytes(value.to_ne_bytes()));
        }
    }
    Err(ClassifyError::Protocol("VarInt longer than 5 bytes".to_owned()))
}

pub(crate) async fn read_varint<R: AsyncRead + Unpin>(reader: &mut R) -> Result<i32, ClassifyError> {
    let mut value = 0u32;
    for shift in (0..35).step_by(7) {
        let byte = reader.read_u8().await?;
        value |= u32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(i32::from_ne_bytes(value.to_ne_bytes()));
        }
    }
    Err(ClassifyError::Protocol("VarInt longer than 5 bytes".to_owned()))
}

fn encode_string(buf: &mut Vec<u8>, value: &str) {
    encode_varint(buf, i32::try_from(value.len()).unwrap_or(i32::MAX));
    buf.extend_from_slice(value.as_bytes());
}

fn decode_string(buf: &mut &[u8]) -> Result<String, ClassifyError> {
    let len = usize::try_from(decode_varint(buf)?)
        .map_err(|_| ClassifyError::Protocol("negative string length".to_owned()))?;
    if len > buf.len() {
        return Err(ClassifyError::Protocol("string runs past end of frame".to_owned()));
    }
    let (bytes, rest) = buf.split_at(len);
    *buf = rest;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| ClassifyError::Protocol("status document is not UTF-8".to_owned()))
}

/// Prefixes `payload` with its VarInt length.
pub(crate) fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 5);
    encode_varint(&mut out, i32::try_from(payload.len()).unwrap_or(i32::MAX));
    out.extend_from_slice(payload);
    out
}

pub(crate) fn handshake(host: &str, port: u16) -> Vec<u8> {
    let mut payload = Vec::with_capacity(host.len() + 16);
    encode_varint(&mut payload, STATUS_PACKET_ID);
    encode_varint(&mut payload, PROTOCOL_VERSION);
    encode_string(&mut payload, host);
    payload.extend_from_slice(&port.to_be_bytes());
    encode_varint(&mut payload, NEXT_STATE_STATUS);
    frame(&payload)
}

pub(crate) async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ClassifyError> {
    let len = read_varint(reader).await?;
    let len = usize::try_from(len)
        .ok()
        .filter(|&len| len > 0 && len <= MAX_FRAME_LEN)
        .ok_or_else(|| ClassifyError::Protocol(format!("implausible frame length {len}")))?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    version: RawVersion,
    players: Option<RawPlayers>,
    description: Option<Value>,
    favicon: Option<String>,
    modinfo: Option<RawModInfo>,
    #[serde(rename = "forgeData")]
    forge_data: Option<RawForgeData>,
}

#[derive(Debug, Deserialize)]
struct RawVersion {
    name: String,
    protocol: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawPlayers {
    online: i64,
    max: i64,
    #[serde(default)]
    sample: Vec<RawPlayer>,
}

#[derive(Debug, Deserialize)]
struct RawPlayer {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawModInfo {
    #[serde(rename = "modList", default)]
    mod_list: Vec<RawMod>,
}

#[derive(Debug, Deserialize)]
struct RawForgeData {
    #[serde(default)]
    mods: Vec<RawMod>,
}

#[derive(Debug, Deserialize)]
struct RawMod {
    #[serde(alias = "modId", alias = "modid")]
    id: String,
    #[serde(alias = "modmarker")]
    version: Option<String>,
}

pub(crate) fn parse_status(document: &str, latency_ms: u64) -> Result<ServerStatus, ClassifyError> {
    let raw: RawStatus = serde_json::from_str(document)?;

    let mut extra = BTreeMap::new();
    let (players_online, players_max) = match raw.players {
        Some(players) => {
            if !players.sample.is_empty() {
                let names: Vec<Value> = players.sample.into_iter().map(|p| Value::String(p.name)).collect();
                extra.insert("player_sample".to_owned(), Value::Array(names));
            }
            (players.online, players.max)
        }
        None => (0, 0),
    };

    let mods = raw
        .modinfo
        .map(|m| m.mod_list)
        .or_else(|| raw.forge_data.map(|f| f.mods))
        .unwrap_or_default();
    if !mods.is_empty() {
        let mods = mods
            .into_iter()
            .map(|m| match m.version {
                Some(version) => Value::String(format!("{} {version}", m.id)),
                None => Value::String(m.id),
            })
            .collect();
        extra.insert("mods".to_owned(), Value::Array(mods));
    }
    if raw.favicon.is_some() {
        extra.insert("favicon".to_owned(), Value::Bool(true));
    }

    let motd = raw
        .description
        .as_ref()
        .map(|d| {
            let mut text = String::new();
            flatten_chat(d, &mut text);
            strip_formatting(&text)
        })
        .unwrap_or_default();

    Ok(ServerStatus {
        kind: ServerKind::Java,
        version: raw.version.name,
        protocol: raw.version.protocol,
        players_online,
        players_max,
        motd,
        latency_ms,
        extra,
    })
}

/// Collects the plain text of a chat component tree.
fn flatten_chat(component: &Value, out: &mut String) {
    match component {
        Value::String(text) => out.push_str(text),
        Value::Array(parts) => parts.iter().for_each(|part| flatten_chat(part, out)),
        Value::Object(map) => {
            if let Some(Value::String(text)) = map.get("text") {
                out.push_str(text);
            }
            if let Some(extra) = map.get("extra") {
                flatten_chat(extra, out);
            }
        }
        _ => {}
    }
}
