//! Graph construction from a parsed trace.
//!
//! The builder turns one rank's event table into nodes and typed edges:
//! it resolves the iteration window, replays each host thread's call stack
//! to produce nesting segments, chains device events per stream, and links
//! launches to their kernels through the correlation index. Cross-stream
//! synchronization edges are added afterwards by the sync resolver.
//!
//! Malformed traces degrade gracefully: offending events are dropped or
//! clamped with a diagnostic and construction continues.

use std::collections::BTreeMap;

use tempo_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use tempo_trace::{Event, RuntimeSyncKind, Trace};

use crate::config::CriticalPathConfig;
use crate::error::GraphError;
use crate::graph::{CpGraph, EdgeCategory, EdgeInsert};
use crate::ids::NodeId;

/// Gap magnitude up to which out-of-order timestamps are considered
/// sub-microsecond profiler jitter and clamped quietly (Note severity);
/// larger violations warn.
const CLAMP_TOLERANCE_NS: i64 = 1_000;

/// Builds the critical-path graph for one rank, minus sync edges.
pub struct GraphBuilder<'a> {
    trace: &'a Trace,
    config: CriticalPathConfig,
    sink: &'a DiagnosticSink,
}

/// One open interval on a host thread's replayed call stack.
struct Frame {
    event: u64,
    end_ts: i64,
    start_node: NodeId,
    /// The node the next segment edge continues from: the frame's start
    /// node, or the end node of the last closed child.
    cursor_node: NodeId,
    cursor_ts: i64,
}

impl<'a> GraphBuilder<'a> {
    /// Creates a builder over the given trace and configuration.
    pub fn new(trace: &'a Trace, config: CriticalPathConfig, sink: &'a DiagnosticSink) -> Self {
        Self {
            trace,
            config,
            sink,
        }
    }

    /// Runs the build, returning a populated graph without cross-stream
    /// sync edges.
    pub fn build(self) -> Result<CpGraph, GraphError> {
        let (t0, t1, annotation_event) = self.resolve_window()?;

        let selected = self.select_events(t0, t1);
        if selected.is_empty() {
            return Err(GraphError::EmptyWindow);
        }

        let mut graph = CpGraph::new(self.trace.rank, (t0, t1), self.config.clone());
        self.add_host_nesting(&mut graph, &selected)?;
        self.add_device_ordering(&mut graph, &selected)?;
        self.add_launch_edges(&mut graph, &selected);
        self.mark_special_events(&mut graph, &selected);
        self.choose_endpoints(&mut graph, annotation_event)?;
        Ok(graph)
    }

    /// Resolves the iteration window `[t0, t1)` and, for a non-empty
    /// selector, the annotation event that spans it.
    fn resolve_window(&self) -> Result<(i64, i64, Option<u64>), GraphError> {
        let selector = &self.config.selector;
        if selector.is_full_trace() {
            let t0 = self.trace.events.iter().map(|e| e.ts).min();
            let t1 = self.trace.events.iter().map(Event::end_ts).max();
            return match (t0, t1) {
                // Half-open window: nudge past the last end so events
                // starting exactly there stay inside.
                (Some(t0), Some(t1)) => Ok((t0, t1 + 1, None)),
                _ => Err(GraphError::EmptyWindow),
            };
        }

        let mut instances: Vec<&Event> = self
            .trace
            .events
            .iter()
            .filter(|e| {
                e.category == tempo_trace::EventCategory::UserAnnotation
                    && self
                        .trace
                        .interner
                        .resolve(e.name)
                        .contains(&selector.annotation)
            })
            .collect();
        instances.sort_by_key(|e| (e.ts, e.index));

        match instances.get(selector.instance as usize) {
            Some(ev) => Ok((ev.ts, ev.end_ts(), Some(ev.index))),
            None => Err(GraphError::NoSuchIteration {
                annotation: selector.annotation.clone(),
                instance: selector.instance,
            }),
        }
    }

    /// Selects events whose interval intersects the window, or whose
    /// correlated partner's does (a kernel outside the window launched from
    /// inside it, or vice versa).
    fn select_events(&self, t0: i64, t1: i64) -> Vec<u64> {
        self.trace
            .events
            .iter()
            .filter(|ev| {
                if ev.intersects(t0, t1) {
                    return true;
                }
                let partner = if ev.is_device() {
                    self.trace.launching_runtime(ev.index)
                } else {
                    self.trace.launched_kernel(ev.index)
                };
                partner
                    .and_then(|p| self.trace.event(p))
                    .is_some_and(|p| p.intersects(t0, t1))
            })
            .map(|ev| ev.index)
            .collect()
    }

    /// Replays each host thread's call stack, creating boundary nodes and
    /// nesting segment edges.
    fn add_host_nesting(&self, graph: &mut CpGraph, selected: &[u64]) -> Result<(), GraphError> {
        let mut threads: BTreeMap<(i64, i64), Vec<&Event>> = BTreeMap::new();
        for &idx in selected {
            let ev = &self.trace.events[idx as usize];
            if ev.is_host() {
                threads.entry((ev.pid, ev.tid)).or_default().push(ev);
            }
        }

        for events in threads.values_mut() {
            // Parents sort before their children at equal start times.
            events.sort_by_key(|e| (e.ts, std::cmp::Reverse(e.dur), e.index));
            self.replay_thread(graph, events)?;
        }
        Ok(())
    }

    /// Replays one thread's time-ordered events through an interval stack.
    fn replay_thread(&self, graph: &mut CpGraph, events: &[&Event]) -> Result<(), GraphError> {
        let mut stack: Vec<Frame> = Vec::new();
        // End node of the last closed top-level event, for sibling gap edges.
        let mut prev_top: Option<(NodeId, i64, u64)> = None;

        for ev in events {
            while stack
                .last()
                .is_some_and(|frame| frame.end_ts <= ev.ts)
            {
                if let Some(closed) = self.close_frame(graph, &mut stack)? {
                    if stack.is_empty() {
                        prev_top = Some(closed);
                    }
                }
            }

            if let Some(top) = stack.last() {
                if ev.end_ts() > top.end_ts {
                    self.sink.emit(
                        Diagnostic::warning(
                            DiagnosticCode::new(Category::Graph, 1),
                            format!(
                                "event overlaps its sibling on thread {} and was dropped",
                                ev.tid
                            ),
                        )
                        .with_event(ev.index),
                    );
                    continue;
                }
            }

            let start_node = graph.add_node(ev.index, true, ev.ts)?;
            if let Some(parent) = stack.last() {
                let gap = ev.ts - parent.cursor_ts;
                self.add_segment(graph, parent.cursor_node, start_node, gap, parent.event, false);
            } else if let Some((prev_node, prev_end, prev_event)) = prev_top {
                // Adjacent top-level siblings: attributed to the earlier
                // event since there is no enclosing parent.
                let gap = ev.ts - prev_end;
                self.add_segment(graph, prev_node, start_node, gap, prev_event, false);
            }

            stack.push(Frame {
                event: ev.index,
                end_ts: ev.end_ts(),
                start_node,
                cursor_node: start_node,
                cursor_ts: ev.ts,
            });
        }

        while !stack.is_empty() {
            self.close_frame(graph, &mut stack)?;
        }
        Ok(())
    }

    /// Closes the innermost open frame: creates its end node and the final
    /// segment edge, then advances the parent's cursor past it.
    fn close_frame(
        &self,
        graph: &mut CpGraph,
        stack: &mut Vec<Frame>,
    ) -> Result<Option<(NodeId, i64, u64)>, GraphError> {
        let Some(frame) = stack.pop() else {
            return Ok(None);
        };
        let end_node = graph.add_node(frame.event, false, frame.end_ts)?;
        let gap = frame.end_ts - frame.cursor_ts;
        let full_span = frame.cursor_node == frame.start_node;
        // A blocking sync call gets no span edge: its end is reached through
        // the device dependency the resolver adds, so the stalled time
        // cannot be claimed by the host side of the graph.
        if !(full_span && self.is_blocking_sync(frame.event)) {
            self.add_segment(graph, frame.cursor_node, end_node, gap, frame.event, full_span);
        }

        if let Some(parent) = stack.last_mut() {
            parent.cursor_node = end_node;
            parent.cursor_ts = frame.end_ts;
        }
        Ok(Some((end_node, frame.end_ts, frame.event)))
    }

    /// Adds a host nesting segment edge.
    ///
    /// Segments with time in them are `OperatorKernel` edges attributed to
    /// the owning event; a zero-length boundary segment degrades to an
    /// unattributed `Dependency` ordering edge. The full span of a leaf
    /// event stays `OperatorKernel` even at zero duration so the per-event
    /// duration invariant holds.
    fn add_segment(
        &self,
        graph: &mut CpGraph,
        src: NodeId,
        dst: NodeId,
        gap: i64,
        owner: u64,
        full_span: bool,
    ) {
        let weight = self.clamp_gap(gap, owner);
        let (category, attributed) = if weight == 0 && !full_span {
            (EdgeCategory::Dependency, None)
        } else {
            (EdgeCategory::OperatorKernel, Some(owner))
        };
        self.insert_edge(graph, src, dst, weight, category, attributed);
    }

    /// Creates device-event nodes and per-stream ordering edges.
    fn add_device_ordering(&self, graph: &mut CpGraph, selected: &[u64]) -> Result<(), GraphError> {
        let mut streams: BTreeMap<i64, Vec<&Event>> = BTreeMap::new();
        for &idx in selected {
            let ev = &self.trace.events[idx as usize];
            if ev.is_device() {
                streams.entry(ev.stream.unwrap_or(ev.tid)).or_default().push(ev);
            }
        }

        for events in streams.values_mut() {
            events.sort_by_key(|e| (e.ts, e.index));
            let mut prev: Option<(&Event, NodeId)> = None;
            for ev in events.iter() {
                let start = graph.add_node(ev.index, true, ev.ts)?;
                let end = graph.add_node(ev.index, false, ev.end_ts())?;
                let weight = self.clamp_gap(ev.dur, ev.index);
                self.insert_edge(
                    graph,
                    start,
                    end,
                    weight,
                    EdgeCategory::OperatorKernel,
                    Some(ev.index),
                );
                graph.mark_device_event(ev.index);

                if let Some((prev_ev, prev_end)) = prev {
                    let gap = ev.ts - prev_ev.end_ts();
                    let weight = self.clamp_gap(gap, prev_ev.index);
                    self.insert_edge(
                        graph,
                        prev_end,
                        start,
                        weight,
                        EdgeCategory::KernelKernelDelay,
                        Some(prev_ev.index),
                    );
                }
                prev = Some((ev, end));
            }
        }
        Ok(())
    }

    /// Links each correlated (runtime call, device event) pair with launch
    /// edges.
    fn add_launch_edges(&self, graph: &mut CpGraph, selected: &[u64]) {
        for &idx in selected {
            let kernel = &self.trace.events[idx as usize];
            if !kernel.is_device() {
                continue;
            }
            let Some(runtime_idx) = self.trace.launching_runtime(kernel.index) else {
                continue;
            };
            let Some((kernel_start, _)) = graph.nodes_for_event(kernel.index) else {
                continue;
            };
            let Some((runtime_start, runtime_end)) = graph.nodes_for_event(runtime_idx) else {
                self.sink.emit(
                    Diagnostic::warning(
                        DiagnosticCode::new(Category::Graph, 3),
                        "launching runtime call is absent from the graph",
                    )
                    .with_event(runtime_idx),
                );
                continue;
            };

            let runtime_ev = &self.trace.events[runtime_idx as usize];
            let weight = self.clamp_gap(kernel.ts - runtime_ev.end_ts(), runtime_idx);
            self.insert_edge(
                graph,
                runtime_end,
                kernel_start,
                weight,
                EdgeCategory::KernelLaunchDelay,
                Some(runtime_idx),
            );

            if self.config.add_zero_weight_launch_edge {
                // A kernel cannot begin before its launch started, whatever
                // the launch call's duration turns out to be.
                self.insert_edge(
                    graph,
                    runtime_start,
                    kernel_start,
                    0,
                    EdgeCategory::KernelLaunchDelay,
                    None,
                );
            }
        }
    }

    /// Marks data-loader events from the configured name patterns.
    fn mark_special_events(&self, graph: &mut CpGraph, selected: &[u64]) {
        if self.config.data_load_events.is_empty() {
            return;
        }
        for &idx in selected {
            let ev = &self.trace.events[idx as usize];
            if !ev.is_host() {
                continue;
            }
            let name = self.trace.interner.resolve(ev.name);
            if self
                .config
                .data_load_events
                .iter()
                .any(|pattern| name.contains(pattern.as_str()))
            {
                graph.mark_data_load_event(ev.index);
            }
        }
    }

    /// Chooses the solver's source and sink nodes: the selected annotation's
    /// boundary pair, or node 0 and the latest node for a full-trace build.
    fn choose_endpoints(
        &self,
        graph: &mut CpGraph,
        annotation_event: Option<u64>,
    ) -> Result<(), GraphError> {
        if graph.node_count() == 0 {
            return Err(GraphError::EmptyWindow);
        }
        let (source, sink) = match annotation_event {
            Some(event) => graph.nodes_for_event(event).ok_or_else(|| {
                tempo_common::InternalError::new(format!(
                    "selected annotation event {event} has no graph nodes"
                ))
            })?,
            None => {
                let last = graph
                    .nodes()
                    .iter()
                    .max_by_key(|n| (n.ts, n.idx))
                    .map(|n| n.idx)
                    .unwrap_or(NodeId::from_raw(0));
                (NodeId::from_raw(0), last)
            }
        };
        graph.set_endpoints(source, sink);
        Ok(())
    }

    /// Returns `true` for host runtime calls that block on device work.
    fn is_blocking_sync(&self, event: u64) -> bool {
        let ev = &self.trace.events[event as usize];
        ev.is_host()
            && RuntimeSyncKind::classify(self.trace.interner.resolve(ev.name))
                .is_some_and(RuntimeSyncKind::is_blocking)
    }

    /// Clamps a possibly-negative gap to zero, logging out-of-order
    /// timestamps. Sub-microsecond violations are profiler jitter and log
    /// quietly; anything larger warns.
    fn clamp_gap(&self, gap: i64, owner: u64) -> u64 {
        if gap >= 0 {
            return gap as u64;
        }
        let diag = if -gap <= CLAMP_TOLERANCE_NS {
            Diagnostic::note(
                DiagnosticCode::new(Category::Graph, 2),
                format!("negative gap of {gap} ns clamped to zero"),
            )
        } else {
            Diagnostic::warning(
                DiagnosticCode::new(Category::Graph, 2),
                format!("timestamps out of order by {} ns, gap clamped to zero", -gap),
            )
        };
        self.sink.emit(diag.with_event(owner));
        0
    }

    /// Inserts an edge, logging deduplicated and refused insertions.
    fn insert_edge(
        &self,
        graph: &mut CpGraph,
        src: NodeId,
        dst: NodeId,
        weight: u64,
        category: EdgeCategory,
        attributed: Option<u64>,
    ) {
        match graph.try_add_edge(src, dst, weight, category, attributed) {
            EdgeInsert::Added(_) => {}
            EdgeInsert::Duplicate(_) => {
                self.sink.emit(Diagnostic::note(
                    DiagnosticCode::new(Category::Graph, 4),
                    format!(
                        "duplicate {} edge between nodes {} and {} dropped",
                        category.label(),
                        src.as_raw(),
                        dst.as_raw()
                    ),
                ));
            }
            EdgeInsert::Backwards => {
                self.sink.emit(Diagnostic::warning(
                    DiagnosticCode::new(Category::Graph, 5),
                    format!(
                        "{} edge between nodes {} and {} would point backwards in time",
                        category.label(),
                        src.as_raw(),
                        dst.as_raw()
                    ),
                ));
            }
        }
    }
}
