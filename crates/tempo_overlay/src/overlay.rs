//! The overlay rewriter.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Map, Value};

use tempo_graph::{CpGraph, EdgeCategory};
use tempo_trace::{is_indexable_event, Trace};

/// Options controlling what the overlaid trace shows.
#[derive(Clone, Copy, Debug, Default)]
pub struct OverlayOptions {
    /// Drop complete events that are not on the critical path. Forces
    /// `show_all_edges` off.
    pub only_show_critical_events: bool,
    /// Emit flow arrows for every graph edge instead of only the CPU↔GPU
    /// dependencies (sync and kernel-launch edges).
    pub show_all_edges: bool,
}

/// Errors raised while producing an overlaid trace.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    /// An I/O error occurred while reading or writing trace files.
    #[error("overlay I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The input trace is not valid JSON.
    #[error("failed to parse trace {path}: {reason}")]
    Json {
        /// The trace file path.
        path: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// The JSON document has no `traceEvents` array.
    #[error("trace {path} has no traceEvents array")]
    MissingTraceEvents {
        /// The trace file path.
        path: PathBuf,
    },
}

/// Rewrites `trace_path` with critical-path annotations into
/// `<out_dir>/overlaid_critical_path_<file name>`, returning the output
/// path. The output directory is created when missing; gz input produces gz
/// output.
///
/// Event indices are re-derived with the loader's indexability predicate, so
/// annotations land on exactly the events the graph was built from.
pub fn overlay_critical_path(
    trace_path: &Path,
    trace: &Trace,
    graph: &CpGraph,
    out_dir: &Path,
    options: OverlayOptions,
) -> Result<PathBuf, OverlayError> {
    let show_all_edges = options.show_all_edges && !options.only_show_critical_events;

    let gz = trace_path.extension().and_then(|e| e.to_str()) == Some("gz");
    let mut doc = read_trace_json(trace_path, gz)?;
    let Some(trace_events) = doc.get_mut("traceEvents").and_then(Value::as_array_mut) else {
        return Err(OverlayError::MissingTraceEvents {
            path: trace_path.to_path_buf(),
        });
    };

    annotate_events(trace_events, graph, options.only_show_critical_events);
    append_flow_events(trace_events, trace, graph, show_all_edges);

    std::fs::create_dir_all(out_dir).map_err(|e| OverlayError::Io {
        path: out_dir.to_path_buf(),
        source: e,
    })?;
    let file_name = trace_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("trace.json");
    let out_path = out_dir.join(format!("overlaid_critical_path_{file_name}"));
    write_trace_json(&out_path, &doc, gz)?;
    Ok(out_path)
}

fn read_trace_json(path: &Path, gz: bool) -> Result<Value, OverlayError> {
    let raw = std::fs::read(path).map_err(|e| OverlayError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let text = if gz {
        let mut decoder = GzDecoder::new(&raw[..]);
        let mut out = String::new();
        decoder
            .read_to_string(&mut out)
            .map_err(|e| OverlayError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        out
    } else {
        String::from_utf8_lossy(&raw).into_owned()
    };
    serde_json::from_str(&text).map_err(|e| OverlayError::Json {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn write_trace_json(path: &Path, doc: &Value, gz: bool) -> Result<(), OverlayError> {
    let text = doc.to_string();
    let io_err = |e: std::io::Error| OverlayError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    if gz {
        let file = std::fs::File::create(path).map_err(io_err)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(text.as_bytes()).map_err(io_err)?;
        encoder.finish().map_err(io_err)?;
    } else {
        std::fs::write(path, text).map_err(io_err)?;
    }
    Ok(())
}

/// Marks critical complete events and optionally drops the rest.
///
/// Walks the raw entries with the same indexability predicate as the loader,
/// so the running index matches [`tempo_trace::Event::index`].
fn annotate_events(trace_events: &mut Vec<Value>, graph: &CpGraph, only_critical: bool) {
    let mut index: u64 = 0;
    let mut kept = Vec::with_capacity(trace_events.len());
    for mut raw in trace_events.drain(..) {
        if !is_indexable_event(&raw) {
            kept.push(raw);
            continue;
        }
        let critical = graph.is_critical_event(index);
        index += 1;

        if critical {
            let args = raw
                .as_object_mut()
                .map(|obj| obj.entry("args").or_insert_with(|| json!({})));
            if let Some(Value::Object(args)) = args {
                args.insert("critical".to_string(), json!(1));
            }
        } else if only_critical {
            continue;
        }
        kept.push(raw);
    }
    *trace_events = kept;
}

/// Appends a flow-arrow pair per emitted graph edge.
///
/// Zero-weight launch edges are solver plumbing and never drawn. Without
/// `show_all_edges` only the CPU↔GPU dependencies (sync and kernel-launch
/// edges) appear.
fn append_flow_events(
    trace_events: &mut Vec<Value>,
    trace: &Trace,
    graph: &CpGraph,
    show_all_edges: bool,
) {
    for (flow_id, edge) in graph.edges().iter().enumerate() {
        if edge.is_zero_weight_launch() {
            continue;
        }
        if !show_all_edges
            && !matches!(
                edge.category,
                EdgeCategory::SyncDependency | EdgeCategory::KernelLaunchDelay
            )
        {
            continue;
        }

        let critical = graph.is_critical_edge(edge.src, edge.dst);
        let flow_type = format!("critical_path_{}", edge.category.label());
        for (phase, node_id) in [("s", edge.src), ("f", edge.dst)] {
            let node = graph.node(node_id);
            let Some(owner) = trace.event(node.event) else {
                continue;
            };
            let mut args = Map::new();
            args.insert("type".to_string(), json!(flow_type));
            args.insert("critical".to_string(), json!(u8::from(critical)));
            trace_events.push(json!({
                "ph": phase,
                "id": flow_id as u64,
                "pid": owner.pid,
                "tid": owner.tid,
                "ts": node.ts as f64 / 1000.0,
                "cat": "critical_path",
                "name": flow_type,
                "bp": "e",
                "args": Value::Object(args),
            }));
        }
    }
}
