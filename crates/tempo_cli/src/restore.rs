//! `tempo restore` — reload a saved graph and report it.
//!
//! A restored graph summarizes without its trace; supplying `--trace-dir`
//! additionally resolves event names for the verbose breakdown, after
//! checking the archive's trace fingerprint against the rank's file.

use tempo_archive::restore_graph;
use tempo_diagnostics::DiagnosticSink;
use tempo_graph::compute_critical_path;
use tempo_trace::{load_trace_file, trace_files, Trace};

use crate::analyze::{print_diagnostics, print_summary};
use crate::{GlobalArgs, ReportFormat, RestoreArgs};

/// Runs the `tempo restore` command.
pub fn run(args: &RestoreArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let (mut graph, meta) = restore_graph(&args.archive)?;

    if args.resolve {
        compute_critical_path(&mut graph)?;
    }

    let sink = DiagnosticSink::new();
    let trace = match &args.trace_dir {
        Some(dir) => find_rank_trace(dir, meta.rank, &sink)?,
        None => None,
    };
    if let Some(trace) = &trace {
        if trace.fingerprint != meta.trace_fingerprint && !global.quiet {
            eprintln!(
                "warning: trace fingerprint mismatch; event names may not match this graph"
            );
        }
    }

    let summary = graph.summary();
    let total_ns: u64 = summary.iter().map(|row| row.total_ns).sum();

    match args.format {
        ReportFormat::Json => {
            let value = serde_json::json!({
                "rank": meta.rank,
                "critical_path_ns": total_ns,
                "node_count": graph.node_count(),
                "critical_edge_count": graph.critical_path_edges().len(),
                "window": meta.window,
                "summary": summary,
            });
            println!("{value}");
        }
        ReportFormat::Text => {
            if !global.quiet {
                println!(
                    "rank {}: critical path {} ns across {} edges ({} nodes, window {:?})",
                    meta.rank,
                    total_ns,
                    graph.critical_path_edges().len(),
                    graph.node_count(),
                    meta.window
                );
                print_summary(&summary);
                if global.verbose {
                    for row in graph.critical_path_breakdown(trace.as_ref()) {
                        println!(
                            "    {:>12} ns  {:<20} {}",
                            row.weight,
                            row.bound_by.as_str(),
                            row.event_name
                        );
                    }
                }
            }
        }
    }

    print_diagnostics(&sink, global);
    Ok(0)
}

/// Loads the trace file whose metadata names the given rank.
fn find_rank_trace(
    dir: &std::path::Path,
    rank: u32,
    sink: &DiagnosticSink,
) -> Result<Option<Trace>, Box<dyn std::error::Error>> {
    for (i, path) in trace_files(dir)?.iter().enumerate() {
        let trace = load_trace_file(path, i as u32, sink)?;
        if trace.rank == rank {
            return Ok(Some(trace));
        }
    }
    Ok(None)
}
