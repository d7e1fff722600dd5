//! Rendering of discoveries and final scan results.
use std::fmt::Write as _;
use std::net::SocketAddr;

use colored::Colorize;

use crate::classify::ServerStatus;
use crate::scanner::ScanEntry;
use crate::target::ScanTarget;

const HEADERS: [&str; 7] = ["#", "Host", "Port", "Latency", "Type", "Version", "Players"];

/// The line printed the moment an open target is recorded.
#[must_use]
pub fn discovery_line(entry: &ScanEntry, accessible: bool) -> String {
    let addr = SocketAddr::new(entry.host, entry.port);
    match entry.classification.status() {
        Some(status) => {
            let line = format!(
                "Found {} server {addr} | {}ms | version {} | players {}",
                status.kind,
                entry.latency_ms,
                status.version,
                status.players()
            );
            if accessible {
                line
            } else {
                line.green().to_string()
            }
        }
        None if accessible => format!("Open {addr} | {}ms", entry.latency_ms),
        None => format!("Open {} | {}ms", addr.to_string().purple(), entry.latency_ms),
    }
}

fn row(index: usize, entry: &ScanEntry) -> [String; 7] {
    let (kind, version, players) = match entry.classification.status() {
        Some(status) => (
            format!("{} server", status.kind),
            status.version.clone(),
            status.players(),
        ),
        None => ("open port".to_owned(), "-".to_owned(), "-".to_owned()),
    };
    [
        (index + 1).to_string(),
        entry.host.to_string(),
        entry.port.to_string(),
        format!("{}ms", entry.latency_ms),
        kind,
        version,
        players,
    ]
}

/// Renders the results as an aligned table, one row per entry in discovery order.
#[must_use]
pub fn results_table(entries: &[ScanEntry], accessible: bool) -> String {
    let rows: Vec<[String; 7]> = entries.iter().enumerate().map(|(i, e)| row(i, e)).collect();
    let mut widths = HEADERS.map(str::len);
    for cells in &rows {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let header = HEADERS
        .iter()
        .zip(widths)
        .map(|(h, w)| format!("{h:<w$}"))
        .collect::<Vec<_>>()
        .join("  ");
    if accessible {
        let _ = writeln!(out, "{header}");
    } else {
        let _ = writeln!(out, "{}", header.bold().cyan());
    }
    let rule_len = widths.iter().sum::<usize>() + 2 * (widths.len() - 1);
    let _ = writeln!(out, "{}", "-".repeat(rule_len));

    for (entry, cells) in entries.iter().zip(&rows) {
        let line = cells
            .iter()
            .zip(widths)
            .map(|(c, w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join("  ");
        if accessible || !entry.classification.is_server() {
            let _ = writeln!(out, "{line}");
        } else {
            let _ = writeln!(out, "{}", line.green());
        }
    }
    out
}

/// `host:port` per line, for piping into other tools.
#[must_use]
pub fn greppable(entries: &[ScanEntry]) -> String {
    entries
        .iter()
        .map(|e| SocketAddr::new(e.host, e.port).to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn to_json(entries: &[ScanEntry]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(entries)
}

/// Key/value summary for a one-off status check.
#[must_use]
pub fn status_details(
    target: &ScanTarget,
    name: &str,
    status: Option<&ServerStatus>,
    connect_latency_ms: Option<u64>,
) -> String {
    let mut rows: Vec<(&str, String)> = vec![("Server", format!("{name}:{}", target.port))];
    rows.push(("Resolved IP", target.host.to_string()));

    match status {
        Some(status) => {
            rows.push(("Latency", format!("{}ms", status.latency_ms)));
            rows.push(("Minecraft", format!("yes ({})", status.kind)));
            rows.push(("Version", status.version.clone()));
            rows.push(("Players", status.players()));
            if !status.motd.is_empty() {
                rows.push(("MOTD", status.motd.clone()));
            }
            for (key, value) in &status.extra {
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Array(items) => items
                        .iter()
                        .map(|i| i.as_str().map_or_else(|| i.to_string(), str::to_owned))
                        .collect::<Vec<_>>()
                        .join(", "),
                    other => other.to_string(),
                };
                rows.push((key.as_str(), value));
            }
        }
        None => {
            rows.push((
                "Latency",
                connect_latency_ms.map_or_else(|| "timed out".to_owned(), |ms| format!("{ms}ms")),
            ));
            rows.push(("Minecraft", "no".to_owned()));
            rows.push((
                "Port",
                if connect_latency_ms.is_some() { "open" } else { "closed or unreachable" }.to_owned(),
            ));
        }
    }

    let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    rows.iter()
        .map(|(k, v)| format!("{k:<width$}  {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Classification, ServerKind};
    use std::collections::BTreeMap;

    fn status() -> ServerStatus {
        ServerStatus {
            kind: ServerKind::Java,
            version: "1.20.4".to_owned(),
            protocol: Some(765),
            players_online: 2,
            players_max: 20,
            motd: "hello".to_owned(),
            latency_ms: 9,
            extra: BTreeMap::from([(
                "mods".to_owned(),
                serde_json::json!(["forge 47", "jei"]),
            )]),
        }
    }

    fn entries() -> Vec<ScanEntry> {
        vec![
            ScanEntry::new("10.0.0.7".parse().unwrap(), 25565, 31, Classification::ApplicationServer(status())),
            ScanEntry::new("10.0.0.2".parse().unwrap(), 25565, 4, Classification::Unclassified),
        ]
    }

    #[test]
    fn discovery_lines_in_accessible_mode() {
        let entries = entries();
        assert_eq!(
            discovery_line(&entries[0], true),
            "Found Java server 10.0.0.7:25565 | 31ms | version 1.20.4 | players 2/20"
        );
        assert_eq!(discovery_line(&entries[1], true), "Open 10.0.0.2:25565 | 4ms");
    }

    #[test]
    fn table_keeps_discovery_order_and_aligns_columns() {
        let table = results_table(&entries(), true);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("#  Host"));
        assert!(lines[2].starts_with("1  10.0.0.7"));
        assert!(lines[2].contains("Java server"));
        assert!(lines[2].contains("2/20"));
        assert!(lines[3].starts_with("2  10.0.0.2"));
        assert!(lines[3].contains("open port"));
        assert_eq!(lines[2].find("25565"), lines[3].find("25565"));
    }

    #[test]
    fn greppable_output_is_one_address_per_line() {
        assert_eq!(greppable(&entries()), "10.0.0.7:25565\n10.0.0.2:25565");
    }

    #[test]
    fn json_output_carries_classification() {
        let json: serde_json::Value = serde_json::from_str(&to_json(&entries()).unwrap()).unwrap();
        assert_eq!(json[0]["classification"]["type"], "application_server");
        assert_eq!(json[0]["classification"]["kind"], "java");
        assert_eq!(json[1]["classification"]["type"], "unclassified");
    }

    #[test]
    fn status_details_for_a_server_and_a_plain_port() {
        let target = ScanTarget {
            host: "10.0.0.7".parse().unwrap(),
            port: 25565,
        };
        let server = status_details(&target, "mc.example.org", Some(&status()), Some(5));
        assert!(server.contains("mc.example.org:25565"));
        assert!(server.contains("yes (Java)"));
        assert!(server.contains("forge 47, jei"));

        let closed = status_details(&target, "10.0.0.7", None, None);
        assert!(closed.contains("timed out"));
        assert!(closed.contains("closed or unreachable"));
    }
}
