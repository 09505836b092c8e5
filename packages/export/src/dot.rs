// ABOUTME: Graphviz DOT rendering of the export graph
// ABOUTME: Nodes are clustered by group (or namespace) with state colors

use std::fmt::Write;

use crate::error::ExportResult;
use crate::model::{ExportData, ExportEdge, ExportNode};

/// DOT rendering options.
#[derive(Debug, Clone, Default)]
pub struct DotOptions {
    /// "TB" (default), "LR", "BT", or "RL".
    pub rank_dir: String,
}

/// Node fill colors matching the frontend state palette.
fn state_color(state: &str) -> &'static str {
    match state {
        "ok" | "up" => "#d4edda",
        "degraded" => "#fff3cd",
        "down" => "#f8d7da",
        _ => "#e2e3e5", // unknown, stale
    }
}

/// Edge colors matching the frontend status palette.
fn status_color(status: &str) -> &'static str {
    match status {
        "timeout" => "#fd7e14",
        "connection_error" | "error" => "#dc3545",
        "dns_error" => "#6f42c1",
        "auth_error" => "#e83e8c",
        "tls_error" => "#20c997",
        "unhealthy" => "#ffc107",
        _ => "#28a745", // ok
    }
}

const CLUSTER_FILL: &str = "#dae8fc";

/// Produces a Graphviz digraph of the export data.
pub fn export_dot(data: &ExportData, opts: &DotOptions) -> ExportResult<Vec<u8>> {
    let rank_dir = if opts.rank_dir.is_empty() {
        "TB"
    } else {
        &opts.rank_dir
    };

    let mut out = String::new();
    out.push_str("digraph depscope {\n");
    let _ = writeln!(out, "  rankdir={rank_dir};");
    out.push_str("  node [shape=box, style=\"rounded,filled\"];\n\n");

    for (cluster, nodes) in group_nodes(&data.nodes) {
        if cluster.is_empty() {
            for n in nodes {
                write_node(&mut out, n, "  ");
            }
            out.push('\n');
        } else {
            let _ = writeln!(out, "  subgraph cluster_{} {{", sanitize_id(&cluster));
            let _ = writeln!(out, "    label={};", quote(&cluster));
            let _ = writeln!(out, "    style=filled; fillcolor=\"{CLUSTER_FILL}\";");
            for n in nodes {
                write_node(&mut out, n, "    ");
            }
            out.push_str("  }\n\n");
        }
    }

    for e in &data.edges {
        write_edge(&mut out, e);
    }

    out.push_str("}\n");
    Ok(out.into_bytes())
}

/// Groups nodes by group, falling back to namespace, preserving the
/// first-seen cluster order.
fn group_nodes(nodes: &[ExportNode]) -> Vec<(String, Vec<&ExportNode>)> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: Vec<(String, Vec<&ExportNode>)> = Vec::new();
    for n in nodes {
        let key = if n.group.is_empty() {
            n.namespace.clone()
        } else {
            n.group.clone()
        };
        match order.iter().position(|k| *k == key) {
            Some(i) => grouped[i].1.push(n),
            None => {
                order.push(key.clone());
                grouped.push((key, vec![n]));
            }
        }
    }
    grouped
}

fn write_node(out: &mut String, n: &ExportNode, indent: &str) {
    let _ = writeln!(
        out,
        "{indent}{} [fillcolor=\"{}\"];",
        quote(&n.id),
        state_color(&n.state)
    );
}

fn write_edge(out: &mut String, e: &ExportEdge) {
    let mut attrs = vec![format!("color=\"{}\"", status_color(&e.status))];
    if !e.kind.is_empty() {
        attrs.push(format!("label={}", quote(&e.kind)));
    }
    if e.critical {
        attrs.push("style=bold".to_string());
    }
    let _ = writeln!(
        out,
        "  {} -> {} [{}];",
        quote(&e.source),
        quote(&e.target),
        attrs.join(", ")
    );
}

/// Double-quotes a DOT string, escaping backslashes and quotes.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// DOT subgraph ids allow alphanumerics and underscores only.
fn sanitize_id(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn data() -> ExportData {
        ExportData {
            version: "1.0".into(),
            timestamp: "2024-05-01T12:00:00Z".into(),
            scope: "full".into(),
            filters: HashMap::new(),
            nodes: vec![
                ExportNode {
                    id: "svc-a".into(),
                    name: "svc-a".into(),
                    namespace: "prod".into(),
                    group: String::new(),
                    kind: "service".into(),
                    state: "ok".into(),
                    alerts: 0,
                },
                ExportNode {
                    id: "pg.local:5432".into(),
                    name: "pg.local".into(),
                    namespace: "prod".into(),
                    group: String::new(),
                    kind: "postgres".into(),
                    state: "down".into(),
                    alerts: 1,
                },
            ],
            edges: vec![ExportEdge {
                source: "svc-a".into(),
                target: "pg.local:5432".into(),
                dependency: "pg.local:5432".into(),
                kind: "postgres".into(),
                host: "pg.local".into(),
                port: "5432".into(),
                critical: true,
                health: 0.0,
                status: "connection_error".into(),
                detail: String::new(),
                latency_ms: 0.0,
            }],
        }
    }

    #[test]
    fn digraph_contains_clusters_states_and_edges() {
        let out = String::from_utf8(export_dot(&data(), &DotOptions::default()).unwrap()).unwrap();

        assert!(out.starts_with("digraph depscope {"));
        assert!(out.contains("rankdir=TB;"));
        assert!(out.contains("subgraph cluster_prod {"));
        assert!(out.contains(r##""svc-a" [fillcolor="#d4edda"];"##));
        assert!(out.contains(r##""pg.local:5432" [fillcolor="#f8d7da"];"##));
        assert!(out.contains(r#""svc-a" -> "pg.local:5432""#));
        assert!(out.contains("style=bold"));
        assert!(out.contains(r##"color="#dc3545""##));
        assert!(out.ends_with("}\n"));
    }

    #[test]
    fn rank_dir_is_configurable() {
        let out = String::from_utf8(
            export_dot(
                &data(),
                &DotOptions {
                    rank_dir: "LR".into(),
                },
            )
            .unwrap(),
        )
        .unwrap();
        assert!(out.contains("rankdir=LR;"));
    }

    #[test]
    fn quoting_escapes_embedded_quotes() {
        assert_eq!(quote(r#"a"b"#), r#""a\"b""#);
        assert_eq!(sanitize_id("prod-eu.west"), "prod_eu_west");
    }
}
