// ABOUTME: BFS engine: downstream root-cause tracing, upstream impact
// ABOUTME: propagation, and chain construction over critical edges

use std::collections::{HashMap, HashSet, VecDeque};

use depscope_topology::{Edge, Node};

use crate::types::{
    AffectedService, AnalysisResult, CascadeChain, Failure, Options, RootCause, Summary,
};

struct Adjacency<'a> {
    outgoing: HashMap<&'a str, Vec<&'a Edge>>,
    incoming: HashMap<&'a str, Vec<&'a Edge>>,
}

fn build_adjacency(edges: &[Edge]) -> Adjacency<'_> {
    let mut adj = Adjacency {
        outgoing: HashMap::new(),
        incoming: HashMap::new(),
    };
    for e in edges {
        adj.outgoing.entry(e.source.as_str()).or_default().push(e);
        adj.incoming.entry(e.target.as_str()).or_default().push(e);
    }
    adj
}

fn is_failed(state: &str) -> bool {
    state == "down" || state == "unknown"
}

/// Traces downstream from a down node through critical edges to the
/// terminal unavailable dependencies. Also returns every node visited on
/// the way, for chain filtering.
fn find_root_causes(
    down_id: &str,
    node_map: &HashMap<&str, &Node>,
    adj: &Adjacency<'_>,
    max_depth: usize,
) -> (Vec<String>, HashSet<String>) {
    let mut root_causes = Vec::new();
    let mut chain_nodes = HashSet::from([down_id.to_string()]);
    let mut visited = HashSet::from([down_id.to_string()]);

    let mut queue = VecDeque::from([(down_id.to_string(), 0usize)]);
    while let Some((current, depth)) = queue.pop_front() {
        for edge in adj.outgoing.get(current.as_str()).into_iter().flatten() {
            if !edge.critical {
                continue;
            }
            let target_id = edge.target.as_str();
            if visited.contains(target_id) {
                continue;
            }
            let Some(target) = node_map.get(target_id) else { continue };
            if !is_failed(&target.state) {
                continue;
            }

            visited.insert(target_id.to_string());
            chain_nodes.insert(target_id.to_string());

            let next_depth = depth + 1;
            if max_depth > 0 && next_depth >= max_depth {
                // Depth cap reached: treat as terminal.
                root_causes.push(target_id.to_string());
                continue;
            }

            // Only a down service can propagate the failure further; an
            // unknown node or raw dependency is a terminal cause.
            if target.kind == "service" && target.state == "down" {
                queue.push_back((target_id.to_string(), next_depth));
            } else {
                root_causes.push(target_id.to_string());
            }
        }
    }

    // No downstream cause: the down node is its own root cause.
    if root_causes.is_empty() {
        root_causes.push(down_id.to_string());
    }
    (root_causes, chain_nodes)
}

/// BFS upstream from a down node through critical edges, collecting the
/// non-down services it impacts and attributing the given root causes.
fn propagate_upstream(
    down_id: &str,
    root_causes: &[String],
    node_map: &HashMap<&str, &Node>,
    adj: &Adjacency<'_>,
) -> HashMap<String, Vec<String>> {
    let mut affected: HashMap<String, Vec<String>> = HashMap::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue = VecDeque::from([down_id.to_string()]);

    while let Some(current) = queue.pop_front() {
        for edge in adj.incoming.get(current.as_str()).into_iter().flatten() {
            if !edge.critical {
                continue;
            }
            let source_id = edge.source.as_str();
            if visited.contains(source_id) {
                continue;
            }
            visited.insert(source_id.to_string());

            let Some(source) = node_map.get(source_id) else { continue };
            // A down node is its own root cause, not an affected service.
            if source.state == "down" {
                continue;
            }

            let entry = affected.entry(source_id.to_string()).or_default();
            for rc in root_causes {
                if !entry.contains(rc) {
                    entry.push(rc.clone());
                }
            }

            queue.push_back(source_id.to_string());
        }
    }

    affected
}

/// BFS from an affected service through critical edges, emitting a chain
/// for every path that ends in a root cause (or hits the depth cap).
/// The cascade set allows traversal through intermediate non-down hops
/// that sit on the cascade path.
fn build_cascade_chains(
    affected_id: &str,
    root_cause_set: &HashSet<String>,
    cascade_set: &HashSet<String>,
    node_map: &HashMap<&str, &Node>,
    adj: &Adjacency<'_>,
    max_depth: usize,
) -> Vec<CascadeChain> {
    let Some(node) = node_map.get(affected_id) else {
        return Vec::new();
    };
    let mut chains = Vec::new();

    let mut visited = HashSet::from([affected_id.to_string()]);
    let mut queue = VecDeque::from([(affected_id.to_string(), vec![node.label.clone()])]);

    while let Some((current, path)) = queue.pop_front() {
        for edge in adj.outgoing.get(current.as_str()).into_iter().flatten() {
            if !edge.critical {
                continue;
            }
            let target_id = edge.target.as_str();
            if visited.contains(target_id) {
                continue;
            }
            let Some(target) = node_map.get(target_id) else { continue };
            if !is_failed(&target.state) && !cascade_set.contains(target_id) {
                continue;
            }

            visited.insert(target_id.to_string());
            let mut new_path = path.clone();
            new_path.push(target.label.clone());

            let capped = max_depth > 0 && new_path.len() - 1 >= max_depth;
            if capped || root_cause_set.contains(target_id) {
                chains.push(CascadeChain {
                    affected_service: node.label.clone(),
                    namespace: node.namespace.clone(),
                    depends_on: target.label.clone(),
                    depth: new_path.len() - 1,
                    path: new_path,
                });
            } else {
                queue.push_back((target_id.to_string(), new_path));
            }
        }
    }

    chains
}

/// Performs cascade failure analysis over the full topology.
pub fn analyze(nodes: &[Node], edges: &[Edge], opts: &Options) -> AnalysisResult {
    let node_map: HashMap<&str, &Node> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let adj = build_adjacency(edges);

    let down_nodes: Vec<&Node> = nodes.iter().filter(|n| n.state == "down").collect();

    let mut root_cause_order: Vec<String> = Vec::new();
    let mut root_cause_set: HashSet<String> = HashSet::new();
    // affected id → deduplicated root cause ids, in discovery order.
    let mut affected_order: Vec<String> = Vec::new();
    let mut affected_map: HashMap<String, Vec<String>> = HashMap::new();

    for dn in &down_nodes {
        let (rcs, _chain) = find_root_causes(&dn.id, &node_map, &adj, opts.max_depth);
        for rc in &rcs {
            if root_cause_set.insert(rc.clone()) {
                root_cause_order.push(rc.clone());
            }
        }

        for (id, causes) in propagate_upstream(&dn.id, &rcs, &node_map, &adj) {
            if !affected_map.contains_key(&id) {
                affected_order.push(id.clone());
            }
            let entry = affected_map.entry(id).or_default();
            for rc in causes {
                if !entry.contains(&rc) {
                    entry.push(rc);
                }
            }
        }
    }
    affected_order.sort();

    // Everything participating in the cascade: affected plus down nodes.
    // Chain construction may pass through any of these.
    let mut cascade_set: HashSet<String> = affected_map.keys().cloned().collect();
    for dn in &down_nodes {
        cascade_set.insert(dn.id.clone());
    }

    let mut result = AnalysisResult::default();

    for rc_id in &root_cause_order {
        if let Some(n) = node_map.get(rc_id.as_str()) {
            result.root_causes.push(RootCause {
                id: n.id.clone(),
                label: n.label.clone(),
                kind: n.kind.clone(),
                namespace: n.namespace.clone(),
                state: n.state.clone(),
            });
        }
    }

    for id in &affected_order {
        let Some(n) = node_map.get(id.as_str()) else { continue };
        let root_causes = affected_map.get(id).cloned().unwrap_or_default();

        // The direct dependency this service follows into the cascade.
        let mut depends_on = String::new();
        for edge in adj.outgoing.get(id.as_str()).into_iter().flatten() {
            if !edge.critical {
                continue;
            }
            if let Some(target) = node_map.get(edge.target.as_str()) {
                if is_failed(&target.state) || cascade_set.contains(edge.target.as_str()) {
                    depends_on = target.label.clone();
                    break;
                }
            }
        }

        result.affected_services.push(AffectedService {
            service: n.label.clone(),
            namespace: n.namespace.clone(),
            depends_on,
            root_causes,
        });
    }

    // Every edge whose target is failed is a failure row.
    for edge in edges {
        let Some(target) = node_map.get(edge.target.as_str()) else { continue };
        if !is_failed(&target.state) {
            continue;
        }
        let (service, namespace) = match node_map.get(edge.source.as_str()) {
            Some(source) => (source.label.clone(), source.namespace.clone()),
            None => (edge.source.clone(), String::new()),
        };
        result.all_failures.push(Failure {
            service,
            namespace,
            dependency: target.label.clone(),
            kind: edge.kind.clone(),
            host: target.host.clone(),
            port: target.port.clone(),
        });
    }

    for id in &affected_order {
        result.cascade_chains.extend(build_cascade_chains(
            id,
            &root_cause_set,
            &cascade_set,
            &node_map,
            &adj,
            opts.max_depth,
        ));
    }

    let service_count = nodes.iter().filter(|n| n.kind == "service").count();
    result.summary = summarize(&result, service_count);

    if opts.namespace.is_empty() {
        result
    } else {
        filter_by_namespace(result, &opts.namespace)
    }
}

/// Cascade analysis restricted to a single service: its affected entry,
/// its chains, the root causes they reference, and the failures along
/// its cascade paths.
pub fn analyze_for_service(
    nodes: &[Node],
    edges: &[Edge],
    service: &str,
    opts: &Options,
) -> AnalysisResult {
    let full = analyze(nodes, edges, &Options {
        max_depth: opts.max_depth,
        namespace: String::new(),
    });

    let mut filtered = AnalysisResult::default();
    let mut relevant_root_causes: HashSet<String> = HashSet::new();

    for aff in &full.affected_services {
        if aff.service == service {
            relevant_root_causes.extend(aff.root_causes.iter().cloned());
            filtered.affected_services.push(aff.clone());
        }
    }

    // The service may itself be a root cause.
    for rc in &full.root_causes {
        if rc.label == service || rc.id == service {
            relevant_root_causes.insert(rc.id.clone());
        }
    }

    for rc in &full.root_causes {
        if relevant_root_causes.contains(&rc.id) {
            filtered.root_causes.push(rc.clone());
        }
    }

    for chain in &full.cascade_chains {
        if chain.affected_service == service {
            filtered.cascade_chains.push(chain.clone());
        }
    }

    let chain_nodes: HashSet<&str> = filtered
        .cascade_chains
        .iter()
        .flat_map(|c| c.path.iter().map(String::as_str))
        .collect();

    for f in &full.all_failures {
        if f.service == service || chain_nodes.contains(f.service.as_str()) {
            filtered.all_failures.push(f.clone());
        }
    }

    filtered.summary = summarize(&filtered, full.summary.total_services);

    if opts.namespace.is_empty() {
        filtered
    } else {
        filter_by_namespace(filtered, &opts.namespace)
    }
}

fn summarize(result: &AnalysisResult, total_services: usize) -> Summary {
    Summary {
        total_services,
        root_cause_count: result.root_causes.len(),
        affected_service_count: result.affected_services.len(),
        total_failure_count: result.all_failures.len(),
        max_depth: result
            .cascade_chains
            .iter()
            .map(|c| c.depth)
            .max()
            .unwrap_or(0),
    }
}

fn filter_by_namespace(result: AnalysisResult, namespace: &str) -> AnalysisResult {
    let total_services = result.summary.total_services;
    let mut filtered = AnalysisResult {
        root_causes: result
            .root_causes
            .into_iter()
            .filter(|rc| rc.namespace == namespace)
            .collect(),
        affected_services: result
            .affected_services
            .into_iter()
            .filter(|a| a.namespace == namespace)
            .collect(),
        all_failures: result
            .all_failures
            .into_iter()
            .filter(|f| f.namespace == namespace)
            .collect(),
        cascade_chains: result
            .cascade_chains
            .into_iter()
            .filter(|c| c.namespace == namespace)
            .collect(),
        summary: Summary::default(),
    };
    filtered.summary = summarize(&filtered, total_services);
    filtered
}
