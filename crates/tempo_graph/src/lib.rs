//! Critical-path analysis over GPU performance traces.
//!
//! This crate is the core of the Tempo analyzer. It converts one rank's
//! event table into a dependency DAG over event boundaries, resolves
//! cross-stream synchronization, and computes the longest weighted path from
//! the iteration's start to its end — the chain of work that explains the
//! iteration's wall time. Critical edges are attributed back to events and
//! aggregated into bottleneck buckets.
//!
//! # Usage
//!
//! ```ignore
//! use tempo_graph::{analyze, CriticalPathConfig, IterationSelector};
//!
//! let config = CriticalPathConfig::for_selector(
//!     IterationSelector::instance("ProfilerStep", 1),
//! );
//! let graph = analyze(&trace, config, &sink)?;
//! for row in graph.summary() {
//!     println!("{:>14}  {:>12} ns  {} edges", row.bound_by, row.total_ns, row.edge_count);
//! }
//! ```
//!
//! # Architecture
//!
//! - [`graph`] — flat-array DAG (boundary nodes, typed weighted edges)
//! - [`builder`] — windowing, host nesting, device ordering, launch edges
//! - [`sync`] — event-record/wait resolution into sync dependency edges
//! - [`solver`] — longest-path computation with deterministic tie-breaks
//! - [`breakdown`] — per-edge attribution and the bound-by summary
//! - [`config`] — explicit build configuration (no environment reads here)

#![warn(missing_docs)]

pub mod breakdown;
pub mod builder;
pub mod config;
pub mod error;
pub mod graph;
pub mod ids;
pub mod solver;
pub mod sync;

#[cfg(test)]
pub(crate) mod fixtures;

pub use breakdown::{BoundBy, BreakdownRow, SummaryRow};
pub use builder::GraphBuilder;
pub use config::{CriticalPathConfig, IterationSelector};
pub use error::GraphError;
pub use graph::{CpEdge, CpGraph, CpNode, EdgeCategory, EdgeInsert};
pub use ids::{EdgeId, NodeId};
pub use solver::compute_critical_path;
pub use sync::SyncResolver;

use tempo_diagnostics::DiagnosticSink;
use tempo_trace::Trace;

/// Builds the graph for one rank and resolves synchronization edges,
/// without solving.
pub fn build_graph(
    trace: &Trace,
    config: CriticalPathConfig,
    sink: &DiagnosticSink,
) -> Result<CpGraph, GraphError> {
    let mut graph = GraphBuilder::new(trace, config, sink).build()?;
    SyncResolver::new(trace, sink).resolve(&mut graph);
    Ok(graph)
}

/// Builds, resolves, and solves in one call.
pub fn analyze(
    trace: &Trace,
    config: CriticalPathConfig,
    sink: &DiagnosticSink,
) -> Result<CpGraph, GraphError> {
    let mut graph = build_graph(trace, config, sink)?;
    compute_critical_path(&mut graph)?;
    Ok(graph)
}
