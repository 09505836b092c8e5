// ABOUTME: Handlers for /api/v1/cascade-analysis and /api/v1/cascade-graph
// ABOUTME: cascade-graph reshapes the analysis into the node-graph panel form

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use depscope_cascade::{analyze, analyze_for_service, AnalysisResult, Options};
use depscope_metrics::QueryOptions;
use depscope_topology::{Node, TopologyResponse};

use crate::error::{ApiError, ApiResult};
use crate::state::{topology_snapshot, AppState};
use crate::topology_handlers::parse_time_param;

#[derive(Debug, Deserialize)]
pub struct CascadeParams {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub depth: String,
    #[serde(default)]
    pub time: String,
}

async fn run_analysis(
    state: &AppState,
    params: &CascadeParams,
) -> ApiResult<(Arc<TopologyResponse>, AnalysisResult)> {
    let max_depth = if params.depth.is_empty() {
        0
    } else {
        params.depth.parse::<usize>().map_err(|_| {
            ApiError::bad_request("invalid depth parameter: must be a non-negative integer")
        })?
    };
    let time = parse_time_param(&params.time)?;

    let opts = QueryOptions {
        time,
        ..Default::default()
    };
    let snapshot = topology_snapshot(state, &opts).await?;

    let cascade_opts = Options {
        max_depth,
        namespace: params.namespace.clone(),
    };
    let result = if params.service.is_empty() {
        analyze(&snapshot.nodes, &snapshot.edges, &cascade_opts)
    } else {
        analyze_for_service(
            &snapshot.nodes,
            &snapshot.edges,
            &params.service,
            &cascade_opts,
        )
    };
    Ok((snapshot, result))
}

/// GET /api/v1/cascade-analysis
pub async fn get_cascade_analysis(
    State(state): State<AppState>,
    Query(params): Query<CascadeParams>,
) -> ApiResult<Response> {
    let (_, result) = run_analysis(&state, &params).await?;
    Ok(Json(result).into_response())
}

/// Node in the Grafana node-graph panel format.
#[derive(Debug, Serialize)]
struct GraphNode {
    id: String,
    title: String,
    #[serde(rename = "subTitle")]
    sub_title: String,
    #[serde(rename = "mainStat")]
    main_stat: String,
    #[serde(rename = "arc__failed")]
    arc_failed: f64,
    #[serde(rename = "arc__degraded")]
    arc_degraded: f64,
    #[serde(rename = "arc__ok")]
    arc_ok: f64,
    #[serde(rename = "arc__unknown")]
    arc_unknown: f64,
}

#[derive(Debug, Serialize)]
struct GraphEdge {
    id: String,
    source: String,
    target: String,
    #[serde(rename = "mainStat")]
    main_stat: String,
}

#[derive(Debug, Serialize)]
struct CascadeGraphResponse {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

/// GET /api/v1/cascade-graph
pub async fn get_cascade_graph(
    State(state): State<AppState>,
    Query(params): Query<CascadeParams>,
) -> ApiResult<Response> {
    let (snapshot, result) = run_analysis(&state, &params).await?;

    let topo_by_id: HashMap<&str, &Node> = snapshot
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), n))
        .collect();

    let mut seen: HashSet<String> = HashSet::new();
    let mut nodes: Vec<GraphNode> = Vec::new();

    let mut add_node = |id: &str, nodes: &mut Vec<GraphNode>| {
        if !seen.insert(id.to_string()) {
            return;
        }

        let mut title = id.to_string();
        let mut namespace = String::new();
        let mut state_label = "unknown".to_string();
        if let Some(tn) = topo_by_id.get(id) {
            if !tn.label.is_empty() {
                title = tn.label.clone();
            }
            namespace = tn.namespace.clone();
            state_label = tn.state.clone();
        }
        // Root causes carry the authoritative state.
        for rc in &result.root_causes {
            if rc.id == id {
                state_label = rc.state.clone();
                if !rc.label.is_empty() {
                    title = rc.label.clone();
                }
                namespace = rc.namespace.clone();
                break;
            }
        }

        let mut node = GraphNode {
            id: id.to_string(),
            title,
            sub_title: namespace,
            main_stat: state_label.clone(),
            arc_failed: 0.0,
            arc_degraded: 0.0,
            arc_ok: 0.0,
            arc_unknown: 0.0,
        };
        match state_label.as_str() {
            "down" => node.arc_failed = 1.0,
            "degraded" => node.arc_degraded = 1.0,
            "ok" => node.arc_ok = 1.0,
            _ => node.arc_unknown = 1.0,
        }
        nodes.push(node);
    };

    // Nodes and edges come from the chain paths; anything the chains
    // missed (isolated root causes, affected services) is appended after.
    let mut edge_seen: HashSet<String> = HashSet::new();
    let mut edges: Vec<GraphEdge> = Vec::new();

    for chain in &result.cascade_chains {
        for (i, step) in chain.path.iter().enumerate() {
            add_node(step, &mut nodes);
            if i > 0 {
                let source = &chain.path[i - 1];
                let edge_id = format!("{source}--{step}");
                if edge_seen.insert(edge_id.clone()) {
                    edges.push(GraphEdge {
                        id: edge_id,
                        source: source.clone(),
                        target: step.clone(),
                        main_stat: String::new(),
                    });
                }
            }
        }
    }

    for rc in &result.root_causes {
        add_node(&rc.id, &mut nodes);
    }
    for aff in &result.affected_services {
        add_node(&aff.service, &mut nodes);
    }

    Ok(Json(CascadeGraphResponse { nodes, edges }).into_response())
}
