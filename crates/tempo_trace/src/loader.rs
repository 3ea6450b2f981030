//! Chrome-trace JSON loading.
//!
//! Reads profiler output (`.json` or `.json.gz`), keeps the complete
//! (`ph == "X"`) events, normalizes categories, and converts microsecond
//! float timestamps to integer nanoseconds by rounding. Event indices are
//! assigned sequentially over complete events in file order; the overlay
//! emitter re-derives the same indices when rewriting the file.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use serde_json::Value;

use tempo_common::{Interner, TraceFingerprint};
use tempo_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};

use crate::event::{Event, EventCategory};
use crate::trace::Trace;

/// Keys under which profilers store the device-event marker id on
/// event-record and event-wait runtime calls.
const DEVICE_EVENT_ID_KEYS: &[&str] = &["CUDA Event Id", "HIP Event Id", "Event Id"];

/// Errors raised while loading a trace file or directory.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// An I/O error occurred while reading the trace file.
    #[error("trace I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid JSON.
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

    /// A directory scan found no trace files.
    #[error("no trace files (*.json, *.json.gz) found in {dir}")]
    NoTraces {
        /// The scanned directory.
        dir: PathBuf,
    },
}

/// Loads one trace file as the given rank's event table.
///
/// The rank recorded in the file's `distributedInfo` metadata wins over
/// `rank_hint`. The fingerprint covers the raw (still compressed) file bytes.
pub fn load_trace_file(
    path: &Path,
    rank_hint: u32,
    sink: &DiagnosticSink,
) -> Result<Trace, LoadError> {
    let raw = std::fs::read(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let fingerprint = TraceFingerprint::from_bytes(&raw);

    let text = if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        let mut decoder = GzDecoder::new(&raw[..]);
        let mut out = String::new();
        decoder
            .read_to_string(&mut out)
            .map_err(|e| LoadError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        out
    } else {
        String::from_utf8(raw).map_err(|e| LoadError::Json {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
    };

    let doc: Value = serde_json::from_str(&text).map_err(|e| LoadError::Json {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let rank = doc
        .get("distributedInfo")
        .and_then(|d| d.get("rank"))
        .and_then(Value::as_u64)
        .map_or(rank_hint, |r| r as u32);

    let trace_events = doc
        .get("traceEvents")
        .and_then(Value::as_array)
        .ok_or_else(|| LoadError::MissingTraceEvents {
            path: path.to_path_buf(),
        })?;

    let interner = Arc::new(Interner::new());
    let events = parse_complete_events(trace_events, &interner, sink);
    Ok(Trace::new(rank, events, interner, fingerprint, sink))
}

/// Lists the trace files in a directory, sorted by name.
pub fn trace_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| LoadError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_trace_file(p))
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(LoadError::NoTraces {
            dir: dir.to_path_buf(),
        });
    }
    Ok(paths)
}

/// Loads every trace file in a directory, one rank per file.
///
/// Files are visited in name order; ranks come from each file's metadata,
/// falling back to the visit position. The result is sorted by rank.
pub fn load_trace_dir(dir: &Path, sink: &DiagnosticSink) -> Result<Vec<Trace>, LoadError> {
    let paths = trace_files(dir)?;
    let mut traces = Vec::with_capacity(paths.len());
    for (i, path) in paths.iter().enumerate() {
        traces.push(load_trace_file(path, i as u32, sink)?);
    }
    traces.sort_by_key(|t| t.rank);
    Ok(traces)
}

fn is_trace_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.ends_with(".json") || name.ends_with(".json.gz")
}

/// Returns `true` for raw entries the loader assigns an event index to:
/// complete (`ph == "X"`) events carrying a name and a numeric timestamp.
///
/// The overlay emitter applies the same predicate when rewriting a trace so
/// its re-derived indices line up with the loader's.
pub fn is_indexable_event(raw: &Value) -> bool {
    raw.get("ph").and_then(Value::as_str) == Some("X")
        && raw.get("name").and_then(Value::as_str).is_some()
        && raw.get("ts").and_then(Value::as_f64).is_some()
}

/// Parses the indexable events out of a raw `traceEvents` array.
///
/// Complete events failing the indexability predicate are skipped with a
/// warning; the analysis is best-effort over whatever remains.
fn parse_complete_events(
    trace_events: &[Value],
    interner: &Interner,
    sink: &DiagnosticSink,
) -> Vec<Event> {
    let mut events = Vec::new();
    for raw in trace_events {
        if raw.get("ph").and_then(Value::as_str) != Some("X") {
            continue;
        }
        if !is_indexable_event(raw) {
            sink.emit(Diagnostic::warning(
                DiagnosticCode::new(Category::Trace, 3),
                "skipping complete event with missing name or timestamp",
            ));
            continue;
        }
        let index = events.len() as u64;
        events.push(parse_event(raw, index, interner));
    }
    events
}

fn parse_event(raw: &Value, index: u64, interner: &Interner) -> Event {
    // Guarded by is_indexable_event.
    let name = raw.get("name").and_then(Value::as_str).unwrap_or_default();
    let ts = raw
        .get("ts")
        .and_then(micros_to_nanos_opt)
        .unwrap_or_default();
    let dur = raw.get("dur").and_then(micros_to_nanos_opt).unwrap_or(0);
    let cat = raw.get("cat").and_then(Value::as_str).unwrap_or("");
    let pid = raw.get("pid").and_then(value_as_i64).unwrap_or(0);
    let tid = raw.get("tid").and_then(value_as_i64).unwrap_or(0);

    let args = raw.get("args");
    let stream = args
        .and_then(|a| a.get("stream"))
        .and_then(value_as_i64);
    let correlation = args
        .and_then(|a| a.get("correlation"))
        .and_then(Value::as_u64);
    let device_event_id = args.and_then(|a| {
        DEVICE_EVENT_ID_KEYS
            .iter()
            .find_map(|key| a.get(*key).and_then(Value::as_u64))
    });

    Event {
        index,
        name: interner.get_or_intern(name),
        category: EventCategory::from_trace_cat(cat),
        ts,
        dur,
        pid,
        tid,
        stream,
        correlation,
        device_event_id,
    }
}

/// Converts a microsecond timestamp value to integer nanoseconds.
///
/// Profilers emit microseconds, recent ones with fractional (sub-microsecond)
/// resolution. Multiplying before rounding preserves that resolution.
fn micros_to_nanos_opt(v: &Value) -> Option<i64> {
    let us = v.as_f64()?;
    Some((us * 1000.0).round() as i64)
}

/// Accepts both JSON numbers and numeric strings, which some profilers emit
/// for pid/tid.
fn value_as_i64(v: &Value) -> Option<i64> {
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}
