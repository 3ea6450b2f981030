//! Synthetic trace construction for tests.

use std::sync::Arc;

use tempo_common::{Interner, TraceFingerprint};
use tempo_diagnostics::DiagnosticSink;
use tempo_trace::{Event, EventCategory, Trace};

/// Builds small hand-written traces event by event.
///
/// Host events live in pid 1 on a caller-chosen tid; device events live in
/// pid 0 with their stream as tid, matching how profilers lay traces out.
pub(crate) struct TraceFixture {
    events: Vec<Event>,
    interner: Arc<Interner>,
}

impl TraceFixture {
    pub(crate) fn new() -> Self {
        Self {
            events: Vec::new(),
            interner: Arc::new(Interner::new()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        name: &str,
        category: EventCategory,
        pid: i64,
        tid: i64,
        ts: i64,
        dur: i64,
        stream: Option<i64>,
        correlation: Option<u64>,
        device_event_id: Option<u64>,
    ) -> u64 {
        let index = self.events.len() as u64;
        self.events.push(Event {
            index,
            name: self.interner.get_or_intern(name),
            category,
            ts,
            dur,
            pid,
            tid,
            stream,
            correlation,
            device_event_id,
        });
        index
    }

    /// A host operator on thread `tid`.
    pub(crate) fn host(&mut self, name: &str, tid: i64, ts: i64, dur: i64) -> u64 {
        self.push(name, EventCategory::HostOp, 1, tid, ts, dur, None, None, None)
    }

    /// A user annotation span on thread `tid`.
    pub(crate) fn annotation(&mut self, name: &str, tid: i64, ts: i64, dur: i64) -> u64 {
        self.push(
            name,
            EventCategory::UserAnnotation,
            1,
            tid,
            ts,
            dur,
            None,
            None,
            None,
        )
    }

    /// A runtime call on thread `tid`, optionally correlated to a kernel.
    pub(crate) fn runtime(
        &mut self,
        name: &str,
        tid: i64,
        ts: i64,
        dur: i64,
        correlation: Option<u64>,
    ) -> u64 {
        self.push(
            name,
            EventCategory::Runtime,
            1,
            tid,
            ts,
            dur,
            None,
            correlation,
            None,
        )
    }

    /// A synchronization runtime call addressing `stream` and/or a recorded
    /// device event marker.
    pub(crate) fn sync_call(
        &mut self,
        name: &str,
        tid: i64,
        ts: i64,
        dur: i64,
        stream: Option<i64>,
        device_event_id: Option<u64>,
    ) -> u64 {
        self.push(
            name,
            EventCategory::Runtime,
            1,
            tid,
            ts,
            dur,
            stream,
            None,
            device_event_id,
        )
    }

    /// A device kernel on `stream`, optionally correlated to its launch.
    pub(crate) fn kernel(
        &mut self,
        name: &str,
        stream: i64,
        ts: i64,
        dur: i64,
        correlation: Option<u64>,
    ) -> u64 {
        self.push(
            name,
            EventCategory::Kernel,
            0,
            stream,
            ts,
            dur,
            Some(stream),
            correlation,
            None,
        )
    }

    /// Finalizes the fixture into a [`Trace`].
    pub(crate) fn build(self, sink: &DiagnosticSink) -> Trace {
        Trace::new(
            0,
            self.events,
            self.interner,
            TraceFingerprint::from_bytes(b"fixture"),
            sink,
        )
    }
}
