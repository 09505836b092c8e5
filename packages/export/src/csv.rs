// ABOUTME: CSV export packaged as a ZIP of nodes.csv and edges.csv
// ABOUTME: Each file carries a UTF-8 BOM for spreadsheet auto-detection

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ExportResult;
use crate::model::{ExportData, ExportEdge, ExportNode};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Produces a ZIP archive containing `nodes.csv` and `edges.csv`.
pub fn export_csv(data: &ExportData) -> ExportResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("nodes.csv", options)?;
    zip.write_all(UTF8_BOM)?;
    zip.write_all(nodes_csv(&data.nodes).as_bytes())?;

    zip.start_file("edges.csv", options)?;
    zip.write_all(UTF8_BOM)?;
    zip.write_all(edges_csv(&data.edges).as_bytes())?;

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

fn nodes_csv(nodes: &[ExportNode]) -> String {
    let mut out = String::new();
    write_record(
        &mut out,
        &["id", "name", "namespace", "group", "type", "state", "alerts"],
    );
    for n in nodes {
        write_record(
            &mut out,
            &[
                &n.id,
                &n.name,
                &n.namespace,
                &n.group,
                &n.kind,
                &n.state,
                &n.alerts.to_string(),
            ],
        );
    }
    out
}

fn edges_csv(edges: &[ExportEdge]) -> String {
    let mut out = String::new();
    write_record(
        &mut out,
        &[
            "source", "target", "dependency", "type", "host", "port", "critical", "health",
            "status", "detail", "latency_ms",
        ],
    );
    for e in edges {
        write_record(
            &mut out,
            &[
                &e.source,
                &e.target,
                &e.dependency,
                &e.kind,
                &e.host,
                &e.port,
                &e.critical.to_string(),
                &format_number(e.health),
                &e.status,
                &e.detail,
                &format_number(e.latency_ms),
            ],
        );
    }
    out
}

fn write_record(out: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape_field(field));
    }
    out.push('\n');
}

/// Quotes a field when it contains a separator, quote, or newline.
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Shortest round-trip rendering: drop a trailing ".0" on whole numbers.
fn format_number(v: f64) -> String {
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}
