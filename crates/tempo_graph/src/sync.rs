//! Cross-stream and device→host synchronization resolution.
//!
//! Profilers record synchronization as paired runtime calls: an event-record
//! stamps a marker onto a stream, and a later event-synchronize or
//! stream-wait-event blocks the host or another stream on that marker. The
//! resolver replays these calls in host order, tracks which kernel each
//! marker was recorded behind, and adds zero-weight [`SyncDependency`] edges.
//!
//! The marker's source kernel is identified on the stream *named by the
//! record call* — never on whichever stream happens to be active in the host
//! thread. Kernels are matched by launch order: the marker lands behind the
//! last kernel whose launch call started at or before the record.
//!
//! [`SyncDependency`]: EdgeCategory::SyncDependency

use std::collections::HashMap;

use tempo_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use tempo_trace::{Event, RuntimeSyncKind, Trace};

use crate::graph::{CpGraph, EdgeCategory, EdgeInsert};
use crate::ids::NodeId;

/// Adds synchronization edges to a built graph.
pub struct SyncResolver<'a> {
    trace: &'a Trace,
    sink: &'a DiagnosticSink,
}

impl<'a> SyncResolver<'a> {
    /// Creates a resolver over the given trace.
    pub fn new(trace: &'a Trace, sink: &'a DiagnosticSink) -> Self {
        Self { trace, sink }
    }

    /// Resolves all synchronization calls in the graph's window.
    pub fn resolve(&self, graph: &mut CpGraph) {
        // Device events present in the graph, per stream, in start order.
        let mut stream_events: HashMap<i64, Vec<&Event>> = HashMap::new();
        for ev in &self.trace.events {
            if ev.is_device() && graph.nodes_for_event(ev.index).is_some() {
                stream_events
                    .entry(ev.stream.unwrap_or(ev.tid))
                    .or_default()
                    .push(ev);
            }
        }
        for events in stream_events.values_mut() {
            events.sort_by_key(|e| (e.ts, e.index));
        }

        // Kernels per stream in launch order: (launch start, kernel index).
        let mut launches: HashMap<i64, Vec<(i64, u64)>> = HashMap::new();
        for (stream, events) in &stream_events {
            let mut seq: Vec<(i64, u64)> = events
                .iter()
                .filter_map(|ev| {
                    let runtime = self.trace.launching_runtime(ev.index)?;
                    let launch_ts = self.trace.event(runtime)?.ts;
                    Some((launch_ts, ev.index))
                })
                .collect();
            seq.sort_unstable();
            launches.insert(*stream, seq);
        }

        let mut sync_calls: Vec<(&Event, RuntimeSyncKind)> = self
            .trace
            .events
            .iter()
            .filter(|ev| ev.is_host() && graph.nodes_for_event(ev.index).is_some())
            .filter_map(|ev| {
                RuntimeSyncKind::classify(self.trace.interner.resolve(ev.name))
                    .map(|kind| (ev, kind))
            })
            .collect();
        sync_calls.sort_by_key(|(ev, _)| (ev.ts, ev.index));

        // Device-event marker id → (source kernel, recording stream).
        let mut records: HashMap<u64, (u64, i64)> = HashMap::new();

        for (call, kind) in sync_calls {
            match kind {
                RuntimeSyncKind::EventRecord => {
                    self.handle_record(call, &launches, &mut records);
                }
                RuntimeSyncKind::EventSynchronize => {
                    if !self.handle_event_synchronize(graph, call, &records) {
                        self.add_span_fallback(graph, call);
                    }
                }
                RuntimeSyncKind::StreamWaitEvent => {
                    self.handle_stream_wait(graph, call, &stream_events, &records);
                }
                RuntimeSyncKind::StreamSynchronize => {
                    if !self.handle_drain_sync(graph, call, &stream_events, call.stream) {
                        self.add_span_fallback(graph, call);
                    }
                }
                RuntimeSyncKind::DeviceSynchronize => {
                    if !self.handle_drain_sync(graph, call, &stream_events, None) {
                        self.add_span_fallback(graph, call);
                    }
                }
            }
        }
    }

    /// Restores the span edge of a blocking sync call that found no device
    /// work to wait on. Such a call spent its time on the host, so it is
    /// treated like any other operator.
    fn add_span_fallback(&self, graph: &mut CpGraph, call: &Event) {
        let Some((start, end)) = graph.nodes_for_event(call.index) else {
            return;
        };
        let weight = call.dur.max(0) as u64;
        match graph.try_add_edge(
            start,
            end,
            weight,
            EdgeCategory::OperatorKernel,
            Some(call.index),
        ) {
            EdgeInsert::Added(_) | EdgeInsert::Duplicate(_) => {}
            EdgeInsert::Backwards => {
                self.sink.emit(
                    Diagnostic::warning(
                        DiagnosticCode::new(Category::Sync, 7),
                        "sync call span would point backwards in time",
                    )
                    .with_event(call.index),
                );
            }
        }
    }

    /// Tracks an event-record: the marker lands behind the last kernel
    /// launched on the named stream at or before the record call.
    fn handle_record(
        &self,
        call: &Event,
        launches: &HashMap<i64, Vec<(i64, u64)>>,
        records: &mut HashMap<u64, (u64, i64)>,
    ) {
        let Some(stream) = call.stream else {
            self.sink.emit(
                Diagnostic::warning(
                    DiagnosticCode::new(Category::Sync, 1),
                    "event-record does not name a stream",
                )
                .with_event(call.index),
            );
            return;
        };
        let Some(marker) = call.device_event_id else {
            self.sink.emit(
                Diagnostic::warning(
                    DiagnosticCode::new(Category::Sync, 2),
                    "event-record carries no device event id",
                )
                .with_event(call.index),
            );
            return;
        };

        let kernel = launches.get(&stream).and_then(|seq| {
            let pos = seq.partition_point(|&(launch_ts, _)| launch_ts <= call.ts);
            (pos > 0).then(|| seq[pos - 1].1)
        });
        match kernel {
            Some(kernel) => {
                records.insert(marker, (kernel, stream));
            }
            None => {
                self.sink.emit(
                    Diagnostic::note(
                        DiagnosticCode::new(Category::Sync, 3),
                        format!("dropping record of marker {marker}: stream {stream} has seen no kernel"),
                    )
                    .with_event(call.index),
                );
            }
        }
    }

    /// Device → host edge: the recorded kernel's end releases the blocking
    /// synchronize call. Returns `true` when an edge was placed (or already
    /// existed).
    fn handle_event_synchronize(
        &self,
        graph: &mut CpGraph,
        call: &Event,
        records: &HashMap<u64, (u64, i64)>,
    ) -> bool {
        let Some(marker) = call.device_event_id else {
            self.sink.emit(
                Diagnostic::warning(
                    DiagnosticCode::new(Category::Sync, 2),
                    "event-synchronize carries no device event id",
                )
                .with_event(call.index),
            );
            return false;
        };
        let Some(&(kernel, _)) = records.get(&marker) else {
            self.sink.emit(
                Diagnostic::warning(
                    DiagnosticCode::new(Category::Sync, 4),
                    format!("event-synchronize waits on unrecorded marker {marker}"),
                )
                .with_event(call.index),
            );
            return false;
        };
        let (Some((_, kernel_end)), Some((_, call_end))) = (
            graph.nodes_for_event(kernel),
            graph.nodes_for_event(call.index),
        ) else {
            return false;
        };
        self.add_sync_edge(graph, kernel_end, call_end)
    }

    /// Device → device edge: the recorded kernel's end gates the first
    /// kernel issued on the waiting stream after the wait call.
    fn handle_stream_wait(
        &self,
        graph: &mut CpGraph,
        call: &Event,
        stream_events: &HashMap<i64, Vec<&Event>>,
        records: &HashMap<u64, (u64, i64)>,
    ) {
        let Some(marker) = call.device_event_id else {
            self.sink.emit(
                Diagnostic::warning(
                    DiagnosticCode::new(Category::Sync, 2),
                    "stream-wait-event carries no device event id",
                )
                .with_event(call.index),
            );
            return;
        };
        let Some(&(kernel, _)) = records.get(&marker) else {
            self.sink.emit(
                Diagnostic::warning(
                    DiagnosticCode::new(Category::Sync, 4),
                    format!("stream-wait-event waits on unrecorded marker {marker}"),
                )
                .with_event(call.index),
            );
            return;
        };
        let Some(dest_stream) = call.stream else {
            self.sink.emit(
                Diagnostic::warning(
                    DiagnosticCode::new(Category::Sync, 1),
                    "stream-wait-event does not name a waiting stream",
                )
                .with_event(call.index),
            );
            return;
        };

        let first_after = stream_events.get(&dest_stream).and_then(|events| {
            let pos = events.partition_point(|e| e.ts < call.ts);
            events.get(pos).copied()
        });
        let Some(dest) = first_after else {
            self.sink.emit(
                Diagnostic::note(
                    DiagnosticCode::new(Category::Sync, 5),
                    format!("no kernel follows the wait on stream {dest_stream}"),
                )
                .with_event(call.index),
            );
            return;
        };
        if dest.index == kernel {
            return;
        }
        let (Some((_, kernel_end)), Some((dest_start, _))) = (
            graph.nodes_for_event(kernel),
            graph.nodes_for_event(dest.index),
        ) else {
            return;
        };
        self.add_sync_edge(graph, kernel_end, dest_start);
    }

    /// Device → host edge for stream- and device-synchronize: the last
    /// device event completing by the call's return gates it. `stream`
    /// restricts the search for stream-synchronize; `None` drains the whole
    /// device. Returns `true` when an edge was placed.
    fn handle_drain_sync(
        &self,
        graph: &mut CpGraph,
        call: &Event,
        stream_events: &HashMap<i64, Vec<&Event>>,
        stream: Option<i64>,
    ) -> bool {
        let last = stream_events
            .iter()
            .filter(|(s, _)| stream.map_or(true, |want| **s == want))
            .flat_map(|(_, events)| events.iter())
            .filter(|ev| ev.end_ts() <= call.end_ts())
            .max_by_key(|ev| (ev.end_ts(), ev.index));
        let Some(last) = last else {
            return false;
        };
        let (Some((_, kernel_end)), Some((_, call_end))) = (
            graph.nodes_for_event(last.index),
            graph.nodes_for_event(call.index),
        ) else {
            return false;
        };
        self.add_sync_edge(graph, kernel_end, call_end)
    }

    /// Inserts a zero-weight sync edge, deduplicating quietly and refusing
    /// edges that would point backwards in time. Returns `true` unless the
    /// edge was refused.
    fn add_sync_edge(&self, graph: &mut CpGraph, src: NodeId, dst: NodeId) -> bool {
        match graph.try_add_edge(src, dst, 0, EdgeCategory::SyncDependency, None) {
            EdgeInsert::Added(_) => true,
            EdgeInsert::Duplicate(_) => {
                self.sink.emit(Diagnostic::note(
                    DiagnosticCode::new(Category::Sync, 6),
                    format!(
                        "duplicate sync dependency between nodes {} and {} dropped",
                        src.as_raw(),
                        dst.as_raw()
                    ),
                ));
                true
            }
            EdgeInsert::Backwards => {
                self.sink.emit(Diagnostic::warning(
                    DiagnosticCode::new(Category::Sync, 7),
                    format!(
                        "sync dependency between nodes {} and {} would point backwards in time",
                        src.as_raw(),
                        dst.as_raw()
                    ),
                ));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::config::CriticalPathConfig;
    use crate::fixtures::TraceFixture;

    fn build_resolved(fixture: TraceFixture) -> (CpGraph, Trace, DiagnosticSink) {
        let sink = DiagnosticSink::new();
        let trace = fixture.build(&sink);
        let mut graph = GraphBuilder::new(&trace, CriticalPathConfig::default(), &sink)
            .build()
            .unwrap();
        SyncResolver::new(&trace, &sink).resolve(&mut graph);
        (graph, trace, sink)
    }

    #[test]
    fn device_synchronize_edge_from_preceding_kernel() {
        let mut fx = TraceFixture::new();
        let _r = fx.runtime("cudaLaunchKernel", 2, 100, 10, Some(1));
        let k = fx.kernel("epilogue_kernel", 20, 120, 40, Some(1));
        let sync = fx.sync_call("cudaDeviceSynchronize", 2, 115, 60, None, None);
        let (graph, _trace, _sink) = build_resolved(fx);

        let (_, k_end) = graph.nodes_for_event(k).unwrap();
        let (_, sync_end) = graph.nodes_for_event(sync).unwrap();
        let edge = graph.edge_between(k_end, sync_end).unwrap();
        assert_eq!(edge.category, EdgeCategory::SyncDependency);
        assert_eq!(edge.weight, 0);
        assert_eq!(graph.attributed_event(k_end, sync_end), None);
    }

    #[test]
    fn event_synchronize_edge_via_record() {
        let mut fx = TraceFixture::new();
        let _r = fx.runtime("cudaLaunchKernel", 2, 100, 10, Some(1));
        let k = fx.kernel("spin_kernel", 20, 120, 200, Some(1));
        let _rec = fx.sync_call("cudaEventRecord", 2, 112, 2, Some(20), Some(5));
        let es = fx.sync_call("cudaEventSynchronize", 2, 130, 220, None, Some(5));
        let (graph, _trace, _sink) = build_resolved(fx);

        let (_, k_end) = graph.nodes_for_event(k).unwrap();
        let (_, es_end) = graph.nodes_for_event(es).unwrap();
        let edge = graph.edge_between(k_end, es_end).unwrap();
        assert_eq!(edge.category, EdgeCategory::SyncDependency);
        assert_eq!(edge.weight, 0);
    }

    #[test]
    fn stream_wait_event_bridges_streams() {
        let mut fx = TraceFixture::new();
        // fft on stream 20, elementwise on stream 7 gated by event record/wait.
        let _r1 = fx.runtime("cudaLaunchKernel", 2, 100, 10, Some(5606));
        let fft = fx.kernel("fft2d_c2r_32x32", 20, 130, 80, Some(5606));
        let _rec = fx.sync_call("cudaEventRecord", 2, 112, 2, Some(20), Some(9));
        let _wait = fx.sync_call("cudaStreamWaitEvent", 2, 118, 3, Some(7), Some(9));
        let _r2 = fx.runtime("cudaLaunchKernel", 2, 124, 5, Some(5629));
        let elwise = fx.kernel("elementwise_kernel", 7, 215, 30, Some(5629));
        let (graph, _trace, _sink) = build_resolved(fx);

        let (_, fft_end) = graph.nodes_for_event(fft).unwrap();
        let (elwise_start, _) = graph.nodes_for_event(elwise).unwrap();
        let edge = graph.edge_between(fft_end, elwise_start).unwrap();
        assert_eq!(edge.category, EdgeCategory::SyncDependency);
        assert_eq!(edge.weight, 0);
    }

    #[test]
    fn record_attributes_to_named_stream_not_latest_kernel() {
        let mut fx = TraceFixture::new();
        // Kernel 1 on stream 20, kernel 2 on stream 28. The record names
        // stream 20, so the marker must land behind kernel 1 even though
        // kernel 2 launched more recently.
        let _r1 = fx.runtime("cudaLaunchKernel", 2, 100, 5, Some(27));
        let k1 = fx.kernel("ampere_sgemm_128x64_nn", 20, 140, 100, Some(27));
        let _r2 = fx.runtime("cudaLaunchKernel", 2, 110, 5, Some(57));
        let k2 = fx.kernel("other_sgemm", 28, 150, 100, Some(57));
        let _rec = fx.sync_call("cudaEventRecord", 2, 120, 2, Some(20), Some(77));
        let _wait = fx.sync_call("cudaStreamWaitEvent", 2, 126, 2, Some(24), Some(77));
        let _r3 = fx.runtime("cudaLaunchKernel", 2, 130, 4, Some(91));
        let k3 = fx.kernel("Memset (Device)", 24, 260, 10, Some(91));
        let (graph, _trace, _sink) = build_resolved(fx);

        let (_, k1_end) = graph.nodes_for_event(k1).unwrap();
        let (_, k2_end) = graph.nodes_for_event(k2).unwrap();
        let (k3_start, _) = graph.nodes_for_event(k3).unwrap();
        assert!(graph.edge_between(k1_end, k3_start).is_some());
        assert!(graph.edge_between(k2_end, k3_start).is_none());
    }

    #[test]
    fn record_on_kernel_less_stream_dropped() {
        let mut fx = TraceFixture::new();
        let _host = fx.host("aten::add", 2, 90, 100);
        let _rec = fx.sync_call("cudaEventRecord", 2, 100, 2, Some(20), Some(5));
        let es = fx.sync_call("cudaEventSynchronize", 2, 110, 20, None, Some(5));
        let (graph, _trace, sink) = build_resolved(fx);

        // No sync edge lands on the synchronize call.
        let (_, es_end) = graph.nodes_for_event(es).unwrap();
        assert!(graph
            .incoming_edges(es_end)
            .iter()
            .all(|&id| graph.edge(id).category != EdgeCategory::SyncDependency));
        assert!(sink
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("has seen no kernel")));
    }

    #[test]
    fn two_markers_on_one_kernel_keep_distinct_targets() {
        let mut fx = TraceFixture::new();
        let _r = fx.runtime("cudaLaunchKernel", 2, 100, 10, Some(1));
        let k = fx.kernel("spin_kernel", 20, 120, 50, Some(1));
        let _rec = fx.sync_call("cudaEventRecord", 2, 112, 2, Some(20), Some(5));
        let _rec2 = fx.sync_call("cudaEventRecord", 2, 115, 2, Some(20), Some(6));
        let es = fx.sync_call("cudaEventSynchronize", 2, 180, 60, None, Some(5));
        let es2 = fx.sync_call("cudaEventSynchronize", 2, 250, 60, None, Some(6));
        let (graph, _trace, _sink) = build_resolved(fx);

        // Both markers resolve to the same kernel; the edges reach different
        // synchronize calls, so both are kept.
        let (_, k_end) = graph.nodes_for_event(k).unwrap();
        let (_, es_end) = graph.nodes_for_event(es).unwrap();
        let (_, es2_end) = graph.nodes_for_event(es2).unwrap();
        assert!(graph.edge_between(k_end, es_end).is_some());
        assert!(graph.edge_between(k_end, es2_end).is_some());
    }

    #[test]
    fn wait_on_unrecorded_marker_warns() {
        let mut fx = TraceFixture::new();
        let _r = fx.runtime("cudaLaunchKernel", 2, 100, 10, Some(1));
        let _k = fx.kernel("sgemm", 20, 120, 50, Some(1));
        let _es = fx.sync_call("cudaEventSynchronize", 2, 130, 60, None, Some(42));
        let (_graph, _trace, sink) = build_resolved(fx);
        assert!(sink
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("unrecorded marker 42")));
    }
}
