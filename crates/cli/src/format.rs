//! Output rendering for the inspection tools
//!
//! Three shapes: a readable aligned table, pretty JSON, and a flat CSV
//! export with the stable column set external tooling scrapes.

use chronicle_core::{Event, Value};

/// Stable CSV column order; changing this breaks downstream scrapers
pub const CSV_HEADERS: &[&str] = &[
    "ts",
    "cmd",
    "status",
    "ack_latency_ms",
    "final_latency_ms",
    "id",
    "job_id",
    "payload_size",
    "error",
    "args",
];

/// Render events as an aligned, human-readable table
pub fn render_table(events: &[Event]) -> String {
    if events.is_empty() {
        return "no events".to_string();
    }

    let mut rows: Vec<[String; 5]> = Vec::with_capacity(events.len() + 1);
    rows.push([
        "TS".to_string(),
        "CMD".to_string(),
        "STATUS".to_string(),
        "LATENCY_MS".to_string(),
        "ARGS".to_string(),
    ]);
    for event in events {
        rows.push([
            event.ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            event.cmd.clone(),
            event.status.as_str().to_string(),
            format!("{:.2}", event.final_latency_ms),
            event.args.join(" "),
        ]);
    }

    let mut widths = [0usize; 5];
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let mut out = String::new();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                out.push_str("  ");
            }
            out.push_str(cell);
            if i < row.len() - 1 {
                for _ in cell.len()..widths[i] {
                    out.push(' ');
                }
            }
        }
        out.push('\n');
    }
    out
}

/// Render events as pretty JSON
pub fn render_json(events: &[Event]) -> String {
    serde_json::to_string_pretty(events).unwrap_or_else(|_| "[]".to_string())
}

/// Render events as flat CSV with the [`CSV_HEADERS`] column set
pub fn render_csv(events: &[Event]) -> String {
    let mut out = String::new();
    out.push_str(&CSV_HEADERS.join(","));
    out.push('\n');
    for event in events {
        let fields = [
            event.ts.to_rfc3339(),
            event.cmd.clone(),
            event.status.as_str().to_string(),
            event
                .ack_latency_ms
                .map(|ms| format!("{:.2}", ms))
                .unwrap_or_default(),
            format!("{:.2}", event.final_latency_ms),
            event.id.clone(),
            event.job_id.clone().unwrap_or_default(),
            event.payload_size.to_string(),
            event.error.clone().unwrap_or_default(),
            event.args.join(" "),
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

/// Render a reconstructed state snapshot as pretty JSON
pub fn render_snapshot(snapshot: &std::collections::HashMap<String, Value>) -> String {
    let json: serde_json::Map<String, serde_json::Value> = snapshot
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    serde_json::to_string_pretty(&serde_json::Value::Object(json))
        .unwrap_or_else(|_| "{}".to_string())
}

/// Quote a CSV field when it needs it
fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use chronicle_core::event::EVENT_SCHEMA_VERSION;
    use chronicle_core::EventStatus;

    fn event(cmd: &str) -> Event {
        Event {
            schema: EVENT_SCHEMA_VERSION,
            id: "id1".to_string(),
            job_id: None,
            ts: Utc::now(),
            ack_ts: None,
            final_ts: Utc::now(),
            cmd: cmd.to_string(),
            args: vec!["a,b".to_string()],
            status: EventStatus::Ok,
            result: None,
            ack_latency_ms: None,
            final_latency_ms: 10.0,
            payload_size: 0,
            error: None,
            agent_version: "0.1.0".to_string(),
        }
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(render_table(&[]), "no events");
    }

    #[test]
    fn test_table_has_header_and_rows() {
        let out = render_table(&[event("login"), event("run")]);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("TS"));
        assert!(lines[1].contains("login"));
    }

    #[test]
    fn test_csv_quotes_embedded_commas() {
        let out = render_csv(&[event("run")]);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], CSV_HEADERS.join(","));
        assert!(lines[1].ends_with("\"a,b\""));
    }
}
