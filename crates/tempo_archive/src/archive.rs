//! Saving and restoring whole graphs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tempo_common::TraceFingerprint;
use tempo_graph::{CpEdge, CpGraph, CpNode, NodeId};

use crate::error::ArchiveError;
use crate::meta::{ArchiveMeta, ARCHIVE_FORMAT_VERSION};
use crate::tables::{read_table, write_table, EdgeRow, NodeRow};

/// File name of the node table within an archive directory.
const NODES_FILE: &str = "nodes.tbl";

/// File name of the edge table within an archive directory.
const EDGES_FILE: &str = "edges.tbl";

/// Saves a graph as `<out_dir>/cpgraph_rank<r>/`, returning the archive
/// directory path.
///
/// The archive is assembled in a temporary sibling directory and renamed
/// into place, replacing any previous archive for the same rank only after
/// the new one is complete.
pub fn save_graph(
    graph: &CpGraph,
    fingerprint: TraceFingerprint,
    out_dir: &Path,
) -> Result<PathBuf, ArchiveError> {
    let final_dir = out_dir.join(format!("cpgraph_rank{}", graph.rank()));
    let tmp_dir = out_dir.join(format!(".cpgraph_rank{}.tmp", graph.rank()));

    let io_err = |path: PathBuf| move |e: std::io::Error| ArchiveError::Io { path, source: e };

    if tmp_dir.exists() {
        std::fs::remove_dir_all(&tmp_dir).map_err(io_err(tmp_dir.clone()))?;
    }
    std::fs::create_dir_all(&tmp_dir).map_err(io_err(tmp_dir.clone()))?;

    let path_pos_of = |idx: NodeId| {
        graph
            .critical_path_nodes()
            .iter()
            .position(|&n| n == idx)
            .map(|p| p as u32)
    };
    let node_rows: Vec<NodeRow> = graph
        .nodes()
        .iter()
        .map(|node| NodeRow {
            node_idx: node.idx.as_raw(),
            event_idx: node.event,
            is_start: node.is_start,
            ts: node.ts,
            path_pos: path_pos_of(node.idx),
        })
        .collect();
    let edge_rows: Vec<EdgeRow> = graph
        .edges()
        .iter()
        .map(|edge| EdgeRow {
            src: edge.src.as_raw(),
            dst: edge.dst.as_raw(),
            weight: edge.weight,
            category: edge.category,
            attributed: graph.attributed_event(edge.src, edge.dst),
            critical: graph.is_critical_edge(edge.src, edge.dst),
        })
        .collect();

    write_table(&tmp_dir.join(NODES_FILE), &node_rows)?;
    write_table(&tmp_dir.join(EDGES_FILE), &edge_rows)?;

    let mut device_events: Vec<u64> = graph.device_events().iter().copied().collect();
    device_events.sort_unstable();
    let mut data_load_events: Vec<u64> = graph.data_load_events().iter().copied().collect();
    data_load_events.sort_unstable();

    let meta = ArchiveMeta {
        version: ARCHIVE_FORMAT_VERSION,
        rank: graph.rank(),
        trace_fingerprint: fingerprint,
        config: graph.config().clone(),
        window: graph.window(),
        source: graph.source().as_raw(),
        sink: graph.sink_node().as_raw(),
        node_count: node_rows.len() as u64,
        edge_count: edge_rows.len() as u64,
        device_events,
        data_load_events,
    };
    meta.save(&tmp_dir)?;

    if final_dir.exists() {
        std::fs::remove_dir_all(&final_dir).map_err(io_err(final_dir.clone()))?;
    }
    std::fs::rename(&tmp_dir, &final_dir).map_err(io_err(final_dir.clone()))?;
    Ok(final_dir)
}

/// Restores a graph from an archive directory.
///
/// Returns the graph with its critical path already populated, plus the
/// metadata (so callers can check the trace fingerprint before resolving
/// names against a trace).
pub fn restore_graph(dir: &Path) -> Result<(CpGraph, ArchiveMeta), ArchiveError> {
    let meta = ArchiveMeta::load(dir)?;

    let node_rows: Vec<NodeRow> = read_table(&dir.join(NODES_FILE))?;
    let edge_rows: Vec<EdgeRow> = read_table(&dir.join(EDGES_FILE))?;

    if node_rows.len() as u64 != meta.node_count {
        return Err(ArchiveError::Corrupt {
            reason: format!(
                "meta.json promises {} nodes but nodes.tbl has {}",
                meta.node_count,
                node_rows.len()
            ),
        });
    }
    if edge_rows.len() as u64 != meta.edge_count {
        return Err(ArchiveError::Corrupt {
            reason: format!(
                "meta.json promises {} edges but edges.tbl has {}",
                meta.edge_count,
                edge_rows.len()
            ),
        });
    }

    let nodes: Vec<(CpNode, Option<u32>)> = node_rows
        .iter()
        .map(|row| {
            (
                CpNode {
                    idx: NodeId::from_raw(row.node_idx),
                    event: row.event_idx,
                    is_start: row.is_start,
                    ts: row.ts,
                },
                row.path_pos,
            )
        })
        .collect();
    let edges: Vec<(CpEdge, Option<u64>, bool)> = edge_rows
        .iter()
        .map(|row| {
            (
                CpEdge {
                    src: NodeId::from_raw(row.src),
                    dst: NodeId::from_raw(row.dst),
                    weight: row.weight,
                    category: row.category,
                },
                row.attributed,
                row.critical,
            )
        })
        .collect();

    let graph = CpGraph::from_parts(
        meta.rank,
        meta.window,
        meta.config.clone(),
        nodes,
        edges,
        NodeId::from_raw(meta.source),
        NodeId::from_raw(meta.sink),
        meta.device_events.iter().copied().collect::<HashSet<u64>>(),
        meta.data_load_events
            .iter()
            .copied()
            .collect::<HashSet<u64>>(),
    )
    .map_err(|e| ArchiveError::Corrupt {
        reason: e.to_string(),
    })?;

    Ok((graph, meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_graph::{compute_critical_path, CriticalPathConfig, EdgeCategory, EdgeInsert};

    /// Hand-builds a small solved graph: host op (0..100) containing a
    /// launch (10..20) whose kernel (40..90) feeds back through a sync edge.
    fn solved_graph() -> CpGraph {
        let mut g = CpGraph::new(0, (0, 101), CriticalPathConfig::default());
        let op_s = g.add_node(0, true, 0).unwrap();
        let launch_s = g.add_node(1, true, 10).unwrap();
        let launch_e = g.add_node(1, false, 20).unwrap();
        let op_e = g.add_node(0, false, 100).unwrap();
        let k_s = g.add_node(2, true, 40).unwrap();
        let k_e = g.add_node(2, false, 90).unwrap();

        let add = |g: &mut CpGraph, s, d, w, c, a| {
            assert!(matches!(g.try_add_edge(s, d, w, c, a), EdgeInsert::Added(_)));
        };
        add(&mut g, op_s, launch_s, 10, EdgeCategory::OperatorKernel, Some(0));
        add(&mut g, launch_s, launch_e, 10, EdgeCategory::OperatorKernel, Some(1));
        add(&mut g, launch_e, op_e, 80, EdgeCategory::OperatorKernel, Some(0));
        add(&mut g, launch_e, k_s, 20, EdgeCategory::KernelLaunchDelay, Some(1));
        add(&mut g, k_s, k_e, 50, EdgeCategory::OperatorKernel, Some(2));
        add(&mut g, k_e, op_e, 0, EdgeCategory::SyncDependency, None);
        g.mark_device_event(2);
        g.set_endpoints(op_s, op_e);
        compute_critical_path(&mut g).unwrap();
        g
    }

    #[test]
    fn save_restore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let graph = solved_graph();
        let fp = TraceFingerprint::from_bytes(b"trace file");
        let archive_dir = save_graph(&graph, fp, dir.path()).unwrap();
        assert!(archive_dir.ends_with("cpgraph_rank0"));
        assert!(archive_dir.join("nodes.tbl").exists());
        assert!(archive_dir.join("edges.tbl").exists());
        assert!(archive_dir.join("meta.json").exists());

        let (restored, meta) = restore_graph(&archive_dir).unwrap();
        assert_eq!(meta.trace_fingerprint, fp);
        assert_eq!(restored.node_count(), graph.node_count());
        assert_eq!(restored.edge_count(), graph.edge_count());
        assert_eq!(restored.window(), graph.window());
        assert_eq!(restored.source(), graph.source());
        assert_eq!(restored.sink_node(), graph.sink_node());
        assert_eq!(restored.nodes(), graph.nodes());
        assert_eq!(restored.edges(), graph.edges());
    }

    #[test]
    fn restored_graph_keeps_critical_path() {
        let dir = tempfile::tempdir().unwrap();
        let graph = solved_graph();
        let fp = TraceFingerprint::from_bytes(b"trace");
        let archive_dir = save_graph(&graph, fp, dir.path()).unwrap();
        let (restored, _meta) = restore_graph(&archive_dir).unwrap();

        // Breakdown and summary work before any re-solve.
        assert_eq!(restored.critical_path_edges(), graph.critical_path_edges());
        assert_eq!(restored.critical_path_nodes(), graph.critical_path_nodes());
        assert_eq!(
            restored.critical_path_events(),
            graph.critical_path_events()
        );
        assert_eq!(restored.summary(), graph.summary());
    }

    #[test]
    fn resolving_restored_graph_reproduces_path() {
        let dir = tempfile::tempdir().unwrap();
        let graph = solved_graph();
        let fp = TraceFingerprint::from_bytes(b"trace");
        let archive_dir = save_graph(&graph, fp, dir.path()).unwrap();
        let (mut restored, _meta) = restore_graph(&archive_dir).unwrap();

        compute_critical_path(&mut restored).unwrap();
        assert_eq!(restored.critical_path_edges(), graph.critical_path_edges());
        assert_eq!(restored.critical_path_nodes(), graph.critical_path_nodes());
    }

    #[test]
    fn save_replaces_existing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let graph = solved_graph();
        let fp = TraceFingerprint::from_bytes(b"trace");
        let first = save_graph(&graph, fp, dir.path()).unwrap();
        let second = save_graph(&graph, fp, dir.path()).unwrap();
        assert_eq!(first, second);
        assert!(restore_graph(&second).is_ok());
    }

    #[test]
    fn count_mismatch_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let graph = solved_graph();
        let fp = TraceFingerprint::from_bytes(b"trace");
        let archive_dir = save_graph(&graph, fp, dir.path()).unwrap();

        // Tamper with the promised node count.
        let meta_path = archive_dir.join("meta.json");
        let mut meta: ArchiveMeta =
            serde_json::from_str(&std::fs::read_to_string(&meta_path).unwrap()).unwrap();
        meta.node_count += 1;
        std::fs::write(&meta_path, serde_json::to_string(&meta).unwrap()).unwrap();

        let err = restore_graph(&archive_dir).unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupt { .. }));
    }

    #[test]
    fn missing_archive_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = restore_graph(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, ArchiveError::Io { .. }));
    }
}
