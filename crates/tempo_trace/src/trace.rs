//! The per-rank event table and its correlation index.

use std::collections::HashMap;
use std::sync::Arc;

use tempo_common::{Interner, TraceFingerprint};
use tempo_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};

use crate::event::Event;

/// The parsed event table for one rank.
///
/// Owns the events in file order, the shared name interner, the fingerprint
/// of the source file, and the correlation index linking device events to
/// the runtime calls that launched them.
#[derive(Debug)]
pub struct Trace {
    /// Rank this trace belongs to.
    pub rank: u32,
    /// All complete events, indexed by [`Event::index`].
    pub events: Vec<Event>,
    /// Shared name interner for this trace.
    pub interner: Arc<Interner>,
    /// Fingerprint of the source trace file.
    pub fingerprint: TraceFingerprint,
    /// Device event index → launching runtime call index.
    kernel_to_runtime: HashMap<u64, u64>,
    /// Runtime call index → launched device event index.
    runtime_to_kernel: HashMap<u64, u64>,
}

impl Trace {
    /// Assembles a trace from parsed events and builds the correlation index.
    ///
    /// When several runtime calls share one correlation id (a malformed
    /// trace), the latest-starting call wins and a warning is emitted.
    /// Device events whose correlation id has no runtime counterpart are
    /// reported and left unlaunched.
    pub fn new(
        rank: u32,
        events: Vec<Event>,
        interner: Arc<Interner>,
        fingerprint: TraceFingerprint,
        sink: &DiagnosticSink,
    ) -> Self {
        let mut runtime_by_corr: HashMap<u64, u64> = HashMap::new();
        for ev in events.iter().filter(|e| e.is_host()) {
            let Some(corr) = ev.correlation else { continue };
            match runtime_by_corr.get(&corr) {
                None => {
                    runtime_by_corr.insert(corr, ev.index);
                }
                Some(&prev) => {
                    // Malformed: keep the latest-starting runtime call.
                    let keep = if events[prev as usize].ts >= ev.ts {
                        prev
                    } else {
                        ev.index
                    };
                    sink.emit(
                        Diagnostic::warning(
                            DiagnosticCode::new(Category::Trace, 1),
                            format!("multiple runtime calls share correlation id {corr}"),
                        )
                        .with_event(keep)
                        .with_note("keeping the latest-starting call"),
                    );
                    runtime_by_corr.insert(corr, keep);
                }
            }
        }

        let mut kernel_to_runtime = HashMap::new();
        let mut runtime_to_kernel = HashMap::new();
        for ev in events.iter().filter(|e| e.is_device()) {
            let Some(corr) = ev.correlation else { continue };
            match runtime_by_corr.get(&corr) {
                Some(&runtime_idx) => {
                    kernel_to_runtime.insert(ev.index, runtime_idx);
                    runtime_to_kernel.insert(runtime_idx, ev.index);
                }
                None => {
                    sink.emit(
                        Diagnostic::warning(
                            DiagnosticCode::new(Category::Trace, 2),
                            format!("device event has no runtime call for correlation id {corr}"),
                        )
                        .with_event(ev.index),
                    );
                }
            }
        }

        Self {
            rank,
            events,
            interner,
            fingerprint,
            kernel_to_runtime,
            runtime_to_kernel,
        }
    }

    /// Looks up an event by its stable index.
    pub fn event(&self, index: u64) -> Option<&Event> {
        self.events.get(index as usize)
    }

    /// Resolves an event's name, or `"<unknown>"` for an out-of-range index.
    pub fn name_of(&self, index: u64) -> &str {
        match self.event(index) {
            Some(ev) => self.interner.resolve(ev.name),
            None => "<unknown>",
        }
    }

    /// The runtime call that launched the given device event, if correlated.
    pub fn launching_runtime(&self, kernel_index: u64) -> Option<u64> {
        self.kernel_to_runtime.get(&kernel_index).copied()
    }

    /// The device event launched by the given runtime call, if correlated.
    pub fn launched_kernel(&self, runtime_index: u64) -> Option<u64> {
        self.runtime_to_kernel.get(&runtime_index).copied()
    }

    /// The full device-event → runtime-call correlation index.
    pub fn index_correlation(&self) -> &HashMap<u64, u64> {
        &self.kernel_to_runtime
    }
}
