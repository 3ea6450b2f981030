//! Attribution of critical time to bottleneck categories.
//!
//! Each critical edge is classified into exactly one `bound_by` bucket, and
//! the summary aggregates critical nanoseconds per bucket. Classification
//! needs no event table: the graph remembers which events were device-side
//! and which matched the data-loader patterns, so a restored graph
//! summarizes on its own. The event table is only consulted to resolve
//! human-readable names in the per-edge breakdown.

use std::fmt;

use serde::{Deserialize, Serialize};
use tempo_trace::Trace;

use crate::graph::{CpEdge, CpGraph, EdgeCategory};
use crate::ids::NodeId;

/// The resource that limited progress along a critical edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundBy {
    /// Host-side compute (operator segments and ordering on CPU events).
    CpuBound,
    /// Device kernel execution.
    GpuKernel,
    /// Kernel launch overhead.
    LaunchDelay,
    /// Gap between consecutive kernels on one stream.
    KernelKernel,
    /// Synchronization stall; contributes no time but shows where the path
    /// crossed a sync boundary.
    SyncStall,
    /// Host-side data-loader work, split out of `CpuBound` when data-loading
    /// patterns are configured.
    DataLoading,
}

impl BoundBy {
    /// Stable snake-case name used in summaries and serialized output.
    pub fn as_str(self) -> &'static str {
        match self {
            BoundBy::CpuBound => "cpu_bound",
            BoundBy::GpuKernel => "gpu_kernel",
            BoundBy::LaunchDelay => "launch_delay",
            BoundBy::KernelKernel => "kernel_kernel",
            BoundBy::SyncStall => "sync_stall",
            BoundBy::DataLoading => "data_loading",
        }
    }
}

impl fmt::Display for BoundBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One critical edge in the per-edge breakdown.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BreakdownRow {
    /// Source node of the edge.
    pub src: NodeId,
    /// Target node of the edge.
    pub dst: NodeId,
    /// The event the edge's weight is attributed to, if any.
    pub event: Option<u64>,
    /// Resolved event name; empty when no event table was supplied.
    pub event_name: String,
    /// The edge's category.
    pub category: EdgeCategory,
    /// The edge's weight in nanoseconds.
    pub weight: u64,
    /// The bottleneck classification; never absent.
    pub bound_by: BoundBy,
}

/// One bucket of the aggregate summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    /// The bucket.
    pub bound_by: BoundBy,
    /// Total critical nanoseconds attributed to the bucket.
    pub total_ns: u64,
    /// Number of critical edges in the bucket.
    pub edge_count: usize,
}

impl CpGraph {
    /// Classifies an edge into its `bound_by` bucket.
    pub fn classify_edge(&self, edge: &CpEdge) -> BoundBy {
        match edge.category {
            EdgeCategory::OperatorKernel | EdgeCategory::Dependency => {
                let event = self
                    .attributed_event(edge.src, edge.dst)
                    .unwrap_or(self.node(edge.src).event);
                if self.is_device_event(event) {
                    BoundBy::GpuKernel
                } else if self.is_data_load_event(event) {
                    BoundBy::DataLoading
                } else {
                    BoundBy::CpuBound
                }
            }
            EdgeCategory::KernelLaunchDelay => BoundBy::LaunchDelay,
            EdgeCategory::KernelKernelDelay => BoundBy::KernelKernel,
            EdgeCategory::SyncDependency => BoundBy::SyncStall,
        }
    }

    /// Produces one row per critical edge, ordered along the path.
    ///
    /// Pass the trace to resolve event names; a restored graph without its
    /// trace produces the same rows with empty names.
    pub fn critical_path_breakdown(&self, trace: Option<&Trace>) -> Vec<BreakdownRow> {
        let mut rows: Vec<BreakdownRow> = self
            .critical_path_edges()
            .iter()
            .filter_map(|&(src, dst)| {
                let edge = self.edge_between(src, dst)?;
                let event = self.attributed_event(src, dst);
                let event_name = match (event, trace) {
                    (Some(idx), Some(trace)) => trace.name_of(idx).to_string(),
                    _ => String::new(),
                };
                Some(BreakdownRow {
                    src,
                    dst,
                    event,
                    event_name,
                    category: edge.category,
                    weight: edge.weight,
                    bound_by: self.classify_edge(edge),
                })
            })
            .collect();
        rows.sort_by_key(|row| {
            let src = self.node(row.src);
            (src.ts, row.src, row.dst)
        });
        rows
    }

    /// Aggregates critical time per bucket.
    ///
    /// Always emits the five fixed buckets in a stable order, with a sixth
    /// `data_loading` row when data-loader patterns were configured; buckets
    /// that gathered nothing report zeros.
    pub fn summary(&self) -> Vec<SummaryRow> {
        let mut buckets = vec![
            BoundBy::CpuBound,
            BoundBy::GpuKernel,
            BoundBy::LaunchDelay,
            BoundBy::KernelKernel,
            BoundBy::SyncStall,
        ];
        if !self.config().data_load_events.is_empty() {
            buckets.push(BoundBy::DataLoading);
        }

        let mut rows: Vec<SummaryRow> = buckets
            .into_iter()
            .map(|bound_by| SummaryRow {
                bound_by,
                total_ns: 0,
                edge_count: 0,
            })
            .collect();

        for &(src, dst) in self.critical_path_edges() {
            let Some(edge) = self.edge_between(src, dst) else {
                continue;
            };
            let bucket = self.classify_edge(edge);
            if let Some(row) = rows.iter_mut().find(|row| row.bound_by == bucket) {
                row.total_ns += edge.weight;
                row.edge_count += 1;
            }
        }
        rows
    }
}
