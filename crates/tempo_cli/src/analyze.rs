//! `tempo analyze` — build, solve, and report critical paths.
//!
//! The full pipeline per rank:
//!
//! 1. Load `tempo.toml` defaults and merge CLI flags over them
//! 2. Load the rank's trace file
//! 3. Build the graph, resolve sync edges, run the longest-path solver
//! 4. Print the bound-by summary (and the per-edge breakdown when verbose)
//! 5. Optionally save the graph archive and write the overlaid trace
//!
//! With `--all-ranks`, ranks are analyzed in parallel; each rank's analysis
//! owns its graph and diagnostic sink outright, so this is the only
//! concurrency in the tool.

use std::path::PathBuf;

use rayon::prelude::*;

use tempo_diagnostics::{render_text, DiagnosticSink, Severity};
use tempo_graph::{analyze as solve_trace, CpGraph, CriticalPathConfig, SummaryRow};
use tempo_overlay::{overlay_critical_path, OverlayOptions};
use tempo_trace::{load_trace_file, trace_files, Trace};

use crate::config;
use crate::{AnalyzeArgs, GlobalArgs, ReportFormat};

/// One rank's loaded inputs.
struct RankJob {
    path: PathBuf,
    trace: Trace,
    sink: DiagnosticSink,
}

/// One rank's analysis results.
struct RankReport {
    rank: u32,
    success: bool,
    total_ns: u64,
    node_count: usize,
    critical_edge_count: usize,
    summary: Vec<SummaryRow>,
    saved: Option<PathBuf>,
    overlaid: Option<PathBuf>,
}

/// Runs the analysis facade for one rank.
///
/// Recoverable failures (selector miss, empty window, disconnected graph)
/// are reported into the sink and surface as `(None, false)`; only the
/// success pair reaches the caller.
pub(crate) fn critical_path_analysis(
    trace: &Trace,
    config: CriticalPathConfig,
    sink: &DiagnosticSink,
) -> (Option<CpGraph>, bool) {
    match solve_trace(trace, config, sink) {
        Ok(graph) => (Some(graph), true),
        Err(err) => {
            sink.emit(tempo_diagnostics::Diagnostic::error(
                tempo_diagnostics::DiagnosticCode::new(tempo_diagnostics::Category::Graph, 100),
                err.to_string(),
            ));
            (None, false)
        }
    }
}

/// Runs the `tempo analyze` command.
///
/// Returns exit code 0 when every selected rank analyzed successfully.
pub fn run(args: &AnalyzeArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let file_config = config::load_file_config(&args.trace_dir)?;
    let base_config = config::resolve_config(args, &file_config);

    let paths = trace_files(&args.trace_dir)?;
    let mut jobs = Vec::with_capacity(paths.len());
    for (i, path) in paths.iter().enumerate() {
        let sink = DiagnosticSink::new();
        let trace = load_trace_file(path, i as u32, &sink)?;
        jobs.push(RankJob {
            path: path.clone(),
            trace,
            sink,
        });
    }

    let jobs: Vec<RankJob> = if args.all_ranks {
        jobs
    } else {
        let selected = match args.rank {
            Some(want) => jobs.into_iter().find(|job| job.trace.rank == want),
            None => jobs.into_iter().next(),
        };
        match selected {
            Some(job) => vec![job],
            None => {
                return Err(format!(
                    "no trace for rank {} in {}",
                    args.rank.unwrap_or(0),
                    args.trace_dir.display()
                )
                .into())
            }
        }
    };

    let reports: Vec<RankReport> = if args.all_ranks {
        jobs.par_iter()
            .map(|job| analyze_rank(job, &base_config, args))
            .collect()
    } else {
        jobs.iter()
            .map(|job| analyze_rank(job, &base_config, args))
            .collect()
    };

    let mut all_ok = true;
    for (job, report) in jobs.iter().zip(&reports) {
        all_ok &= report.success;
        print_report(report, args.format, global);
        print_diagnostics(&job.sink, global);
    }
    Ok(if all_ok { 0 } else { 1 })
}

/// Analyzes one rank: solve, then save and overlay as requested.
fn analyze_rank(job: &RankJob, config: &CriticalPathConfig, args: &AnalyzeArgs) -> RankReport {
    let (graph, success) = critical_path_analysis(&job.trace, config.clone(), &job.sink);
    let mut report = RankReport {
        rank: job.trace.rank,
        success,
        total_ns: 0,
        node_count: 0,
        critical_edge_count: 0,
        summary: Vec::new(),
        saved: None,
        overlaid: None,
    };
    let Some(graph) = graph else {
        return report;
    };

    report.node_count = graph.node_count();
    report.critical_edge_count = graph.critical_path_edges().len();
    report.summary = graph.summary();
    report.total_ns = report.summary.iter().map(|row| row.total_ns).sum();

    if let Some(save_dir) = &args.save {
        match tempo_archive::save_graph(&graph, job.trace.fingerprint, save_dir) {
            Ok(path) => report.saved = Some(path),
            Err(err) => {
                report.success = false;
                job.sink.emit(tempo_diagnostics::Diagnostic::error(
                    tempo_diagnostics::DiagnosticCode::new(
                        tempo_diagnostics::Category::Archive,
                        100,
                    ),
                    err.to_string(),
                ));
            }
        }
    }

    if let Some(overlay_dir) = &args.overlay {
        let options = OverlayOptions {
            only_show_critical_events: args.only_critical_events,
            show_all_edges: args.show_all_edges,
        };
        match overlay_critical_path(&job.path, &job.trace, &graph, overlay_dir, options) {
            Ok(path) => report.overlaid = Some(path),
            Err(err) => {
                report.success = false;
                job.sink.emit(tempo_diagnostics::Diagnostic::error(
                    tempo_diagnostics::DiagnosticCode::new(
                        tempo_diagnostics::Category::Archive,
                        101,
                    ),
                    err.to_string(),
                ));
            }
        }
    }

    report
}

/// Prints one rank's report in the requested format.
fn print_report(report: &RankReport, format: ReportFormat, global: &GlobalArgs) {
    match format {
        ReportFormat::Json => {
            let value = serde_json::json!({
                "rank": report.rank,
                "success": report.success,
                "critical_path_ns": report.total_ns,
                "node_count": report.node_count,
                "critical_edge_count": report.critical_edge_count,
                "summary": report.summary,
            });
            println!("{value}");
        }
        ReportFormat::Text => {
            if !report.success {
                println!("rank {}: analysis failed", report.rank);
                return;
            }
            if global.quiet {
                return;
            }
            println!(
                "rank {}: critical path {} ns across {} edges ({} nodes)",
                report.rank, report.total_ns, report.critical_edge_count, report.node_count
            );
            print_summary(&report.summary);
            if let Some(path) = &report.saved {
                println!("  saved graph archive to {}", path.display());
            }
            if let Some(path) = &report.overlaid {
                println!("  wrote overlaid trace to {}", path.display());
            }
        }
    }
}

/// Prints a bound-by summary as an aligned table.
pub(crate) fn print_summary(summary: &[SummaryRow]) {
    for row in summary {
        println!(
            "  {:>14}  {:>14} ns  {:>6} edges",
            row.bound_by.as_str(),
            row.total_ns,
            row.edge_count
        );
    }
}

/// Prints a rank's diagnostics: warnings and errors by default, notes too
/// when verbose, nothing when quiet (errors always go through).
pub(crate) fn print_diagnostics(sink: &DiagnosticSink, global: &GlobalArgs) {
    for diag in sink.diagnostics() {
        let show = match diag.severity {
            Severity::Error => true,
            Severity::Warning => !global.quiet,
            Severity::Note => global.verbose && !global.quiet,
        };
        if show {
            eprint!("{}", render_text(&diag));
        }
    }
}
