//! Longest-path computation over the dependency DAG.
//!
//! Nodes are visited in topological order, which for this graph is the
//! `(timestamp, node index)` order: every edge flows forward in time by
//! construction. Equal-timestamp groups are locally ordered by their edges
//! (Kahn's scheme with a `(timestamp, index)` priority), so zero-weight
//! edges between simultaneous boundaries relax correctly too.
//!
//! A single relaxation pass computes `dist[v] = max(dist[u] + weight)` with
//! back-pointers; ties pick the predecessor edge with the higher fixed
//! category priority, which makes attribution deterministic.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use tempo_common::InternalError;

use crate::error::GraphError;
use crate::graph::CpGraph;
use crate::ids::{EdgeId, NodeId};

/// Computes the critical path from the graph's source to its sink.
///
/// Populates the graph's critical path fields and returns the path's total
/// weight, which equals the wall time the path explains. Fails with
/// [`GraphError::Disconnected`] when no dependency chain links source to
/// sink.
pub fn compute_critical_path(graph: &mut CpGraph) -> Result<u64, GraphError> {
    let order = topological_order(graph)?;

    let n = graph.node_count();
    let source = graph.source();
    let sink = graph.sink_node();

    let mut dist: Vec<Option<u64>> = vec![None; n];
    let mut pred: Vec<Option<EdgeId>> = vec![None; n];
    dist[source.as_usize()] = Some(0);

    for &v in &order {
        if v == source {
            continue;
        }
        for &edge_id in graph.incoming_edges(v) {
            let edge = *graph.edge(edge_id);
            let Some(upstream) = dist[edge.src.as_usize()] else {
                continue;
            };
            let candidate = upstream + edge.weight;
            let slot = v.as_usize();
            let replace = match (dist[slot], pred[slot]) {
                (None, _) => true,
                (Some(current), _) if candidate > current => true,
                (Some(current), Some(incumbent)) if candidate == current => {
                    edge.category.priority() > graph.edge(incumbent).category.priority()
                }
                _ => false,
            };
            if replace {
                dist[slot] = Some(candidate);
                pred[slot] = Some(edge_id);
            }
        }
    }

    let total = dist[sink.as_usize()].ok_or(GraphError::Disconnected)?;

    // Recover the path by walking back-pointers from the sink.
    let mut path_nodes = vec![sink];
    let mut path_edges = HashSet::new();
    let mut current = sink;
    while current != source {
        let Some(edge_id) = pred[current.as_usize()] else {
            return Err(InternalError::new(format!(
                "critical path backtrack lost its predecessor at node {}",
                current.as_raw()
            ))
            .into());
        };
        let edge = graph.edge(edge_id);
        path_edges.insert((edge.src, edge.dst));
        current = edge.src;
        path_nodes.push(current);
    }
    path_nodes.reverse();

    graph.set_critical_path(path_nodes, path_edges);
    Ok(total)
}

/// Produces a topological order preferring `(timestamp, node index)`.
///
/// Fails with an internal error if the graph contains a cycle, which the
/// forward-in-time insertion rule is supposed to make impossible.
fn topological_order(graph: &CpGraph) -> Result<Vec<NodeId>, GraphError> {
    let n = graph.node_count();
    let mut indegree: Vec<u32> = vec![0; n];
    for edge in graph.edges() {
        indegree[edge.dst.as_usize()] += 1;
    }

    let mut ready: BinaryHeap<Reverse<(i64, NodeId)>> = graph
        .nodes()
        .iter()
        .filter(|node| indegree[node.idx.as_usize()] == 0)
        .map(|node| Reverse((node.ts, node.idx)))
        .collect();

    let mut order = Vec::with_capacity(n);
    while let Some(Reverse((_, v))) = ready.pop() {
        order.push(v);
        for &edge_id in graph.outgoing_edges(v) {
            let dst = graph.edge(edge_id).dst;
            indegree[dst.as_usize()] -= 1;
            if indegree[dst.as_usize()] == 0 {
                ready.push(Reverse((graph.node(dst).ts, dst)));
            }
        }
    }

    if order.len() != n {
        return Err(InternalError::new("cycle detected in dependency graph").into());
    }
    Ok(order)
}
