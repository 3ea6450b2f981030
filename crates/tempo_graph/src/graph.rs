//! The critical-path graph data structure.
//!
//! [`CpGraph`] is a directed acyclic graph over event boundaries: every event
//! contributes a start node and an end node, and typed, weighted edges encode
//! durations, delays, and ordering between them. Storage is flat arrays
//! (`Vec<CpNode>`, `Vec<CpEdge>`) with a `(src, dst) → edge` map and
//! adjacency lists of edge ids, keeping the solver's topological pass
//! cache-friendly.
//!
//! Acyclicity is maintained by construction: an edge whose target timestamp
//! precedes its source is refused at insertion.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tempo_common::{InternalError, TempoResult};

use crate::config::CriticalPathConfig;
use crate::ids::{EdgeId, NodeId};

/// The category of a graph edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeCategory {
    /// Intra-event duration, or a host nesting/sibling segment of the
    /// enclosing event.
    OperatorKernel,
    /// Host launch → device kernel start.
    KernelLaunchDelay,
    /// End of one kernel → start of the next on the same stream.
    KernelKernelDelay,
    /// Cross-stream or device↔host dependency; always zero weight.
    SyncDependency,
    /// Zero-weight ordering between nested host events.
    Dependency,
}

impl EdgeCategory {
    /// Fixed priority used to break ties deterministically when two
    /// predecessors reach a node with equal distance.
    pub fn priority(self) -> u8 {
        match self {
            EdgeCategory::OperatorKernel => 4,
            EdgeCategory::KernelLaunchDelay => 3,
            EdgeCategory::KernelKernelDelay => 2,
            EdgeCategory::SyncDependency => 1,
            EdgeCategory::Dependency => 0,
        }
    }

    /// Stable snake-case label, used in archives and overlay flow tags.
    pub fn label(self) -> &'static str {
        match self {
            EdgeCategory::OperatorKernel => "operator_kernel",
            EdgeCategory::KernelLaunchDelay => "kernel_launch_delay",
            EdgeCategory::KernelKernelDelay => "kernel_kernel_delay",
            EdgeCategory::SyncDependency => "sync_dependency",
            EdgeCategory::Dependency => "dependency",
        }
    }
}

/// A point in time: the start or end of exactly one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpNode {
    /// This node's index.
    pub idx: NodeId,
    /// The originating event's index.
    pub event: u64,
    /// `true` for the event's start boundary, `false` for its end.
    pub is_start: bool,
    /// Timestamp in nanoseconds.
    pub ts: i64,
}

/// A directed, weighted, categorized edge between two nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpEdge {
    /// Source node.
    pub src: NodeId,
    /// Target node.
    pub dst: NodeId,
    /// Weight in nanoseconds; zero-weight edges model dependency without
    /// duration.
    pub weight: u64,
    /// Edge category.
    pub category: EdgeCategory,
}

impl CpEdge {
    /// Returns `true` for the optional zero-weight launch edges emitted
    /// under `add_zero_weight_launch_edge`; overlay emission skips them.
    pub fn is_zero_weight_launch(&self) -> bool {
        self.category == EdgeCategory::KernelLaunchDelay && self.weight == 0
    }
}

/// The outcome of an edge insertion attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeInsert {
    /// The edge was added.
    Added(EdgeId),
    /// An edge between these nodes already exists; the first one wins.
    Duplicate(EdgeId),
    /// The edge would point backwards in time and was refused.
    Backwards,
}

/// The critical-path graph for one rank's iteration window.
#[derive(Debug)]
pub struct CpGraph {
    rank: u32,
    window: (i64, i64),
    config: CriticalPathConfig,

    nodes: Vec<CpNode>,
    edges: Vec<CpEdge>,
    edge_index: HashMap<(NodeId, NodeId), EdgeId>,
    incoming: Vec<Vec<EdgeId>>,
    outgoing: Vec<Vec<EdgeId>>,

    event_start: HashMap<u64, NodeId>,
    event_end: HashMap<u64, NodeId>,
    edge_to_event: HashMap<(NodeId, NodeId), u64>,
    event_to_edges: HashMap<u64, Vec<EdgeId>>,

    /// Events that executed on the device; kept here so a restored graph can
    /// classify `cpu_bound` vs `gpu_kernel` without the event table.
    device_events: HashSet<u64>,
    /// Events matching the configured data-loader patterns.
    data_load_events: HashSet<u64>,

    source: NodeId,
    sink: NodeId,

    critical_path_nodes: Vec<NodeId>,
    critical_path_edges: HashSet<(NodeId, NodeId)>,
    critical_path_events: HashSet<u64>,
}

impl CpGraph {
    /// Creates an empty graph for the given rank and iteration window.
    pub fn new(rank: u32, window: (i64, i64), config: CriticalPathConfig) -> Self {
        Self {
            rank,
            window,
            config,
            nodes: Vec::new(),
            edges: Vec::new(),
            edge_index: HashMap::new(),
            incoming: Vec::new(),
            outgoing: Vec::new(),
            event_start: HashMap::new(),
            event_end: HashMap::new(),
            edge_to_event: HashMap::new(),
            event_to_edges: HashMap::new(),
            device_events: HashSet::new(),
            data_load_events: HashSet::new(),
            source: NodeId::from_raw(0),
            sink: NodeId::from_raw(0),
            critical_path_nodes: Vec::new(),
            critical_path_edges: HashSet::new(),
            critical_path_events: HashSet::new(),
        }
    }

    /// The rank this graph was built for.
    pub fn rank(&self) -> u32 {
        self.rank
    }

    /// The half-open iteration window `[t0, t1)`.
    pub fn window(&self) -> (i64, i64) {
        self.window
    }

    /// The configuration this graph was built with.
    pub fn config(&self) -> &CriticalPathConfig {
        &self.config
    }

    /// Adds a boundary node for an event.
    ///
    /// Each event may register exactly one start and one end node; a second
    /// registration is an invariant violation.
    pub fn add_node(&mut self, event: u64, is_start: bool, ts: i64) -> TempoResult<NodeId> {
        let registry = if is_start {
            &mut self.event_start
        } else {
            &mut self.event_end
        };
        if registry.contains_key(&event) {
            let side = if is_start { "start" } else { "end" };
            return Err(InternalError::new(format!(
                "duplicate {side} node for event {event}"
            )));
        }

        let idx = NodeId::from_raw(self.nodes.len() as u32);
        registry.insert(event, idx);
        self.nodes.push(CpNode {
            idx,
            event,
            is_start,
            ts,
        });
        self.incoming.push(Vec::new());
        self.outgoing.push(Vec::new());
        Ok(idx)
    }

    /// Attempts to add an edge.
    ///
    /// At most one edge exists per ordered node pair; a second insertion
    /// reports [`EdgeInsert::Duplicate`] and leaves the first edge in place.
    /// Edges whose target timestamp precedes their source are refused with
    /// [`EdgeInsert::Backwards`], which keeps the graph acyclic by
    /// construction. `attributed` names the event responsible for the edge's
    /// weight and populates the edge→event attribution map.
    pub fn try_add_edge(
        &mut self,
        src: NodeId,
        dst: NodeId,
        weight: u64,
        category: EdgeCategory,
        attributed: Option<u64>,
    ) -> EdgeInsert {
        if self.nodes[dst.as_usize()].ts < self.nodes[src.as_usize()].ts {
            return EdgeInsert::Backwards;
        }
        if let Some(&existing) = self.edge_index.get(&(src, dst)) {
            return EdgeInsert::Duplicate(existing);
        }

        let id = EdgeId::from_raw(self.edges.len() as u32);
        self.edges.push(CpEdge {
            src,
            dst,
            weight,
            category,
        });
        self.edge_index.insert((src, dst), id);
        self.outgoing[src.as_usize()].push(id);
        self.incoming[dst.as_usize()].push(id);
        if let Some(event) = attributed {
            self.edge_to_event.insert((src, dst), event);
            self.event_to_edges.entry(event).or_default().push(id);
        }
        EdgeInsert::Added(id)
    }

    /// Returns the node with the given ID.
    pub fn node(&self, id: NodeId) -> &CpNode {
        &self.nodes[id.as_usize()]
    }

    /// Returns the edge with the given ID.
    pub fn edge(&self, id: EdgeId) -> &CpEdge {
        &self.edges[id.as_usize()]
    }

    /// All nodes, indexed by node ID.
    pub fn nodes(&self) -> &[CpNode] {
        &self.nodes
    }

    /// All edges, indexed by edge ID.
    pub fn edges(&self) -> &[CpEdge] {
        &self.edges
    }

    /// The edge between two nodes, if one exists.
    pub fn edge_between(&self, src: NodeId, dst: NodeId) -> Option<&CpEdge> {
        self.edge_index.get(&(src, dst)).map(|&id| self.edge(id))
    }

    /// IDs of the edges arriving at the given node.
    pub fn incoming_edges(&self, node: NodeId) -> &[EdgeId] {
        &self.incoming[node.as_usize()]
    }

    /// IDs of the edges leaving the given node.
    pub fn outgoing_edges(&self, node: NodeId) -> &[EdgeId] {
        &self.outgoing[node.as_usize()]
    }

    /// The (start, end) node pair of an event, if the event is in the graph.
    pub fn nodes_for_event(&self, event: u64) -> Option<(NodeId, NodeId)> {
        Some((
            *self.event_start.get(&event)?,
            *self.event_end.get(&event)?,
        ))
    }

    /// The event an edge's weight is attributed to, if any.
    ///
    /// Populated only for weighted categories (`OperatorKernel`,
    /// `KernelLaunchDelay`, `KernelKernelDelay`); sync and ordering edges are
    /// delay-only.
    pub fn attributed_event(&self, src: NodeId, dst: NodeId) -> Option<u64> {
        self.edge_to_event.get(&(src, dst)).copied()
    }

    /// All edges attributed to the given event.
    pub fn edges_attributed_to(&self, event: u64) -> &[EdgeId] {
        self.event_to_edges
            .get(&event)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Marks an event as device-side.
    pub fn mark_device_event(&mut self, event: u64) {
        self.device_events.insert(event);
    }

    /// Returns `true` if the event executed on the device.
    pub fn is_device_event(&self, event: u64) -> bool {
        self.device_events.contains(&event)
    }

    /// The set of device-side events in the graph.
    pub fn device_events(&self) -> &HashSet<u64> {
        &self.device_events
    }

    /// Marks an event as data-loader work.
    pub fn mark_data_load_event(&mut self, event: u64) {
        self.data_load_events.insert(event);
    }

    /// Returns `true` if the event matched a data-loader pattern.
    pub fn is_data_load_event(&self, event: u64) -> bool {
        self.data_load_events.contains(&event)
    }

    /// The set of data-loader events in the graph.
    pub fn data_load_events(&self) -> &HashSet<u64> {
        &self.data_load_events
    }

    /// Sets the solver's source and sink nodes.
    pub fn set_endpoints(&mut self, source: NodeId, sink: NodeId) {
        self.source = source;
        self.sink = sink;
    }

    /// The solver's source node.
    pub fn source(&self) -> NodeId {
        self.source
    }

    /// The solver's sink node.
    pub fn sink_node(&self) -> NodeId {
        self.sink
    }

    /// Installs a solved critical path.
    ///
    /// `critical_path_events` is derived as the set of events some critical
    /// edge is attributed to.
    pub fn set_critical_path(&mut self, nodes: Vec<NodeId>, edges: HashSet<(NodeId, NodeId)>) {
        self.critical_path_events = edges
            .iter()
            .filter_map(|&(u, v)| self.attributed_event(u, v))
            .collect();
        self.critical_path_nodes = nodes;
        self.critical_path_edges = edges;
    }

    /// The solved critical path's nodes, in path order. Empty before solving.
    pub fn critical_path_nodes(&self) -> &[NodeId] {
        &self.critical_path_nodes
    }

    /// The solved critical path's edges.
    pub fn critical_path_edges(&self) -> &HashSet<(NodeId, NodeId)> {
        &self.critical_path_edges
    }

    /// Events attributed to some critical edge.
    pub fn critical_path_events(&self) -> &HashSet<u64> {
        &self.critical_path_events
    }

    /// Returns `true` if the edge between these nodes lies on the critical
    /// path.
    pub fn is_critical_edge(&self, src: NodeId, dst: NodeId) -> bool {
        self.critical_path_edges.contains(&(src, dst))
    }

    /// Returns `true` if the event is attributed to some critical edge.
    pub fn is_critical_event(&self, event: u64) -> bool {
        self.critical_path_events.contains(&event)
    }

    /// Reassembles a graph from archived parts, rebuilding every derived
    /// index and validating structural invariants.
    ///
    /// `nodes` pairs each node with its position on the saved critical path
    /// (when it was on one); `edges` pairs each edge with its attributed
    /// event and critical flag.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        rank: u32,
        window: (i64, i64),
        config: CriticalPathConfig,
        nodes: Vec<(CpNode, Option<u32>)>,
        edges: Vec<(CpEdge, Option<u64>, bool)>,
        source: NodeId,
        sink: NodeId,
        device_events: HashSet<u64>,
        data_load_events: HashSet<u64>,
    ) -> TempoResult<Self> {
        let mut graph = Self::new(rank, window, config);
        graph.device_events = device_events;
        graph.data_load_events = data_load_events;

        let mut path_positions: Vec<(u32, NodeId)> = Vec::new();
        for (i, (node, path_pos)) in nodes.into_iter().enumerate() {
            if node.idx.as_usize() != i {
                return Err(InternalError::new(format!(
                    "archived node {i} carries index {}",
                    node.idx.as_raw()
                )));
            }
            let idx = graph.add_node(node.event, node.is_start, node.ts)?;
            if let Some(pos) = path_pos {
                path_positions.push((pos, idx));
            }
        }

        let node_count = graph.node_count();
        let mut critical_edges = HashSet::new();
        for (edge, attributed, critical) in edges {
            if edge.src.as_usize() >= node_count || edge.dst.as_usize() >= node_count {
                return Err(InternalError::new(
                    "archived edge references a node out of range",
                ));
            }
            match graph.try_add_edge(edge.src, edge.dst, edge.weight, edge.category, attributed) {
                EdgeInsert::Added(_) => {}
                EdgeInsert::Duplicate(_) | EdgeInsert::Backwards => {
                    return Err(InternalError::new(format!(
                        "archived edge {} -> {} is duplicated or backwards",
                        edge.src.as_raw(),
                        edge.dst.as_raw()
                    )));
                }
            }
            if critical {
                critical_edges.insert((edge.src, edge.dst));
            }
        }

        if source.as_usize() >= node_count || sink.as_usize() >= node_count {
            return Err(InternalError::new("archived endpoints out of range"));
        }
        graph.set_endpoints(source, sink);

        path_positions.sort_unstable();
        let path_nodes = path_positions.into_iter().map(|(_, id)| id).collect();
        graph.set_critical_path(path_nodes, critical_edges);
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_graph() -> CpGraph {
        CpGraph::new(0, (0, 1_000), CriticalPathConfig::default())
    }

    #[test]
    fn category_priorities_ordered() {
        assert!(EdgeCategory::OperatorKernel.priority() > EdgeCategory::KernelLaunchDelay.priority());
        assert!(
            EdgeCategory::KernelLaunchDelay.priority() > EdgeCategory::KernelKernelDelay.priority()
        );
        assert!(EdgeCategory::KernelKernelDelay.priority() > EdgeCategory::SyncDependency.priority());
        assert!(EdgeCategory::SyncDependency.priority() > EdgeCategory::Dependency.priority());
    }

    #[test]
    fn add_nodes_and_lookup() {
        let mut g = empty_graph();
        let s = g.add_node(5, true, 100).unwrap();
        let t = g.add_node(5, false, 150).unwrap();
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.nodes_for_event(5), Some((s, t)));
        assert!(g.node(s).is_start);
        assert!(!g.node(t).is_start);
        assert_eq!(g.node(t).ts, 150);
    }

    #[test]
    fn duplicate_node_is_fatal() {
        let mut g = empty_graph();
        g.add_node(5, true, 100).unwrap();
        assert!(g.add_node(5, true, 120).is_err());
    }

    #[test]
    fn add_edge_with_attribution() {
        let mut g = empty_graph();
        let s = g.add_node(5, true, 100).unwrap();
        let t = g.add_node(5, false, 150).unwrap();
        let id = match g.try_add_edge(s, t, 50, EdgeCategory::OperatorKernel, Some(5)) {
            EdgeInsert::Added(id) => id,
            other => panic!("expected Added, got {other:?}"),
        };
        assert_eq!(g.edge(id).weight, 50);
        assert_eq!(g.attributed_event(s, t), Some(5));
        assert_eq!(g.edges_attributed_to(5), &[id]);
        assert_eq!(g.incoming_edges(t), &[id]);
        assert_eq!(g.outgoing_edges(s), &[id]);
    }

    #[test]
    fn duplicate_edge_first_wins() {
        let mut g = empty_graph();
        let s = g.add_node(1, true, 100).unwrap();
        let t = g.add_node(1, false, 150).unwrap();
        let first = g.try_add_edge(s, t, 50, EdgeCategory::OperatorKernel, Some(1));
        let second = g.try_add_edge(s, t, 0, EdgeCategory::SyncDependency, None);
        let EdgeInsert::Added(id) = first else {
            panic!("first insert failed")
        };
        assert_eq!(second, EdgeInsert::Duplicate(id));
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.edge(id).category, EdgeCategory::OperatorKernel);
    }

    #[test]
    fn backwards_edge_refused() {
        let mut g = empty_graph();
        let a = g.add_node(1, true, 200).unwrap();
        let b = g.add_node(2, true, 100).unwrap();
        assert_eq!(
            g.try_add_edge(a, b, 0, EdgeCategory::SyncDependency, None),
            EdgeInsert::Backwards
        );
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn equal_timestamp_edge_allowed() {
        let mut g = empty_graph();
        let a = g.add_node(1, false, 100).unwrap();
        let b = g.add_node(2, true, 100).unwrap();
        assert!(matches!(
            g.try_add_edge(a, b, 0, EdgeCategory::Dependency, None),
            EdgeInsert::Added(_)
        ));
    }

    #[test]
    fn delay_only_edges_have_no_attribution() {
        let mut g = empty_graph();
        let a = g.add_node(1, false, 100).unwrap();
        let b = g.add_node(2, true, 120).unwrap();
        g.try_add_edge(a, b, 0, EdgeCategory::SyncDependency, None);
        assert_eq!(g.attributed_event(a, b), None);
    }

    #[test]
    fn zero_weight_launch_detection() {
        let e = CpEdge {
            src: NodeId::from_raw(0),
            dst: NodeId::from_raw(1),
            weight: 0,
            category: EdgeCategory::KernelLaunchDelay,
        };
        assert!(e.is_zero_weight_launch());
        let e2 = CpEdge { weight: 27, ..e };
        assert!(!e2.is_zero_weight_launch());
        let e3 = CpEdge {
            category: EdgeCategory::SyncDependency,
            ..e
        };
        assert!(!e3.is_zero_weight_launch());
    }

    #[test]
    fn critical_path_event_derivation() {
        let mut g = empty_graph();
        let s = g.add_node(7, true, 0).unwrap();
        let t = g.add_node(7, false, 10).unwrap();
        let u = g.add_node(8, true, 10).unwrap();
        g.try_add_edge(s, t, 10, EdgeCategory::OperatorKernel, Some(7));
        g.try_add_edge(t, u, 0, EdgeCategory::Dependency, None);
        let mut edges = HashSet::new();
        edges.insert((s, t));
        edges.insert((t, u));
        g.set_critical_path(vec![s, t, u], edges);
        assert!(g.is_critical_event(7));
        assert!(!g.is_critical_event(8));
        assert_eq!(g.critical_path_nodes().len(), 3);
    }

    #[test]
    fn from_parts_roundtrip() {
        let mut g = empty_graph();
        let s = g.add_node(7, true, 0).unwrap();
        let t = g.add_node(7, false, 10).unwrap();
        g.try_add_edge(s, t, 10, EdgeCategory::OperatorKernel, Some(7));
        g.set_endpoints(s, t);
        let mut edges = HashSet::new();
        edges.insert((s, t));
        g.set_critical_path(vec![s, t], edges);
        g.mark_device_event(7);

        let nodes: Vec<(CpNode, Option<u32>)> = g
            .nodes()
            .iter()
            .map(|n| {
                let pos = g
                    .critical_path_nodes()
                    .iter()
                    .position(|&p| p == n.idx)
                    .map(|p| p as u32);
                (*n, pos)
            })
            .collect();
        let edges: Vec<(CpEdge, Option<u64>, bool)> = g
            .edges()
            .iter()
            .map(|e| {
                (
                    *e,
                    g.attributed_event(e.src, e.dst),
                    g.is_critical_edge(e.src, e.dst),
                )
            })
            .collect();

        let restored = CpGraph::from_parts(
            g.rank(),
            g.window(),
            g.config().clone(),
            nodes,
            edges,
            g.source(),
            g.sink_node(),
            g.device_events().clone(),
            g.data_load_events().clone(),
        )
        .unwrap();

        assert_eq!(restored.node_count(), 2);
        assert_eq!(restored.edge_count(), 1);
        assert_eq!(restored.attributed_event(s, t), Some(7));
        assert!(restored.is_critical_edge(s, t));
        assert!(restored.is_critical_event(7));
        assert!(restored.is_device_event(7));
        assert_eq!(restored.critical_path_nodes(), &[s, t]);
    }

    #[test]
    fn from_parts_rejects_out_of_range_edge() {
        let nodes = vec![(
            CpNode {
                idx: NodeId::from_raw(0),
                event: 0,
                is_start: true,
                ts: 0,
            },
            None,
        )];
        let edges = vec![(
            CpEdge {
                src: NodeId::from_raw(0),
                dst: NodeId::from_raw(9),
                weight: 1,
                category: EdgeCategory::OperatorKernel,
            },
            None,
            false,
        )];
        let result = CpGraph::from_parts(
            0,
            (0, 1),
            CriticalPathConfig::default(),
            nodes,
            edges,
            NodeId::from_raw(0),
            NodeId::from_raw(0),
            HashSet::new(),
            HashSet::new(),
        );
        assert!(result.is_err());
    }
}
