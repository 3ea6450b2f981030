//! The event record and category normalization.

use serde::{Deserialize, Serialize};
use tempo_common::Ident;

/// One profiled event from the trace: a host operator, a runtime call, or a
/// device-side execution.
///
/// Timestamps and durations are integer nanoseconds. Device events carry the
/// stream they executed on; host events carry the process/thread that issued
/// them. A runtime launch and the device event it produced share a
/// correlation id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Stable index of this event: its position in the parsed event table.
    pub index: u64,
    /// Interned event name.
    pub name: Ident,
    /// Normalized category.
    pub category: EventCategory,
    /// Start timestamp in nanoseconds.
    pub ts: i64,
    /// Duration in nanoseconds (zero for instantaneous events).
    pub dur: i64,
    /// Process identifier.
    pub pid: i64,
    /// Thread identifier (host events) or the profiler's device lane id
    /// (device events).
    pub tid: i64,
    /// Device stream, for device events and stream-addressed runtime calls.
    pub stream: Option<i64>,
    /// Correlation id linking a runtime launch to its device event.
    pub correlation: Option<u64>,
    /// Device-event marker id, carried by event-record and event-wait
    /// runtime calls.
    pub device_event_id: Option<u64>,
}

impl Event {
    /// The end timestamp of this event, `ts + dur`.
    pub fn end_ts(&self) -> i64 {
        self.ts + self.dur
    }

    /// Returns `true` if this event executed on the device.
    pub fn is_device(&self) -> bool {
        self.category.is_device()
    }

    /// Returns `true` if this event ran on a host thread.
    pub fn is_host(&self) -> bool {
        !self.is_device()
    }

    /// Returns `true` if any part of `[ts, end_ts)` intersects the half-open
    /// window `[t0, t1)`.
    pub fn intersects(&self, t0: i64, t1: i64) -> bool {
        self.ts < t1 && self.end_ts() > t0 || (self.dur == 0 && self.ts >= t0 && self.ts < t1)
    }
}

/// Normalized event category.
///
/// The loader maps vendor category strings onto this enum so NVIDIA and AMD
/// traces traverse identical analysis code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Host-side operator (e.g. `aten::relu_`).
    HostOp,
    /// Host-side runtime/driver API call (e.g. `cudaLaunchKernel`).
    Runtime,
    /// Device compute kernel.
    Kernel,
    /// Device memory operation (copy or set).
    MemoryOp,
    /// Device-side synchronization event (stream/event wait executed on
    /// the device).
    DeviceSync,
    /// User annotation span (e.g. a profiler step marker).
    UserAnnotation,
    /// Anything else; carried through but never on the critical path unless
    /// nested host events put it there.
    Other,
}

impl EventCategory {
    /// Maps a raw trace category string to a normalized category.
    pub fn from_trace_cat(cat: &str) -> Self {
        match cat {
            "cpu_op" | "cpu_instant_event" | "Operator" => EventCategory::HostOp,
            "cuda_runtime" | "cuda_driver" | "hip_runtime" | "hip_api" | "Runtime" => {
                EventCategory::Runtime
            }
            "kernel" | "Kernel" => EventCategory::Kernel,
            "gpu_memcpy" | "gpu_memset" | "Memcpy" | "Memset" => EventCategory::MemoryOp,
            "cuda_sync" | "gpu_sync" => EventCategory::DeviceSync,
            "user_annotation" | "gpu_user_annotation" => EventCategory::UserAnnotation,
            _ => EventCategory::Other,
        }
    }

    /// Returns `true` for categories that execute on the device and occupy
    /// a stream.
    pub fn is_device(self) -> bool {
        matches!(
            self,
            EventCategory::Kernel | EventCategory::MemoryOp | EventCategory::DeviceSync
        )
    }
}

/// The synchronization role of a host-side runtime call, derived from its
/// name.
///
/// Covers the CUDA and HIP spellings; everything the sync resolver needs to
/// know about vendor vocabulary is decided here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeSyncKind {
    /// Stamps a device-event marker onto a stream.
    EventRecord,
    /// Blocks the host until a recorded device event completes.
    EventSynchronize,
    /// Makes a stream wait for a recorded device event.
    StreamWaitEvent,
    /// Blocks the host until a stream drains.
    StreamSynchronize,
    /// Blocks the host until the whole device drains.
    DeviceSynchronize,
}

impl RuntimeSyncKind {
    /// Returns `true` for calls that block the host until device work
    /// completes.
    ///
    /// Blocking calls get no intra-event span edge in the graph; their end is
    /// reached through the device dependency instead, so the stalled time is
    /// attributed to the device work that caused it rather than to the host.
    pub fn is_blocking(self) -> bool {
        matches!(
            self,
            RuntimeSyncKind::EventSynchronize
                | RuntimeSyncKind::StreamSynchronize
                | RuntimeSyncKind::DeviceSynchronize
        )
    }

    /// Classifies a runtime-call name, returning `None` for calls with no
    /// synchronization role.
    pub fn classify(name: &str) -> Option<Self> {
        match name {
            "cudaEventRecord" | "hipEventRecord" => Some(RuntimeSyncKind::EventRecord),
            "cudaEventSynchronize" | "hipEventSynchronize" => {
                Some(RuntimeSyncKind::EventSynchronize)
            }
            "cudaStreamWaitEvent" | "hipStreamWaitEvent" => Some(RuntimeSyncKind::StreamWaitEvent),
            "cudaStreamSynchronize" | "hipStreamSynchronize" => {
                Some(RuntimeSyncKind::StreamSynchronize)
            }
            "cudaDeviceSynchronize" | "hipDeviceSynchronize" => {
                Some(RuntimeSyncKind::DeviceSynchronize)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_common::Interner;

    fn make_event(ts: i64, dur: i64) -> Event {
        let interner = Interner::new();
        Event {
            index: 0,
            name: interner.get_or_intern("test"),
            category: EventCategory::HostOp,
            ts,
            dur,
            pid: 1,
            tid: 1,
            stream: None,
            correlation: None,
            device_event_id: None,
        }
    }

    #[test]
    fn end_ts() {
        assert_eq!(make_event(100, 25).end_ts(), 125);
    }

    #[test]
    fn intersects_window() {
        let e = make_event(100, 50);
        assert!(e.intersects(0, 200));
        assert!(e.intersects(120, 130));
        assert!(e.intersects(149, 500));
        assert!(!e.intersects(150, 500));
        assert!(!e.intersects(0, 100));
    }

    #[test]
    fn zero_duration_intersects_at_start() {
        let e = make_event(100, 0);
        assert!(e.intersects(100, 200));
        assert!(!e.intersects(101, 200));
    }

    #[test]
    fn nvidia_categories() {
        assert_eq!(EventCategory::from_trace_cat("cpu_op"), EventCategory::HostOp);
        assert_eq!(
            EventCategory::from_trace_cat("cuda_runtime"),
            EventCategory::Runtime
        );
        assert_eq!(EventCategory::from_trace_cat("kernel"), EventCategory::Kernel);
        assert_eq!(
            EventCategory::from_trace_cat("gpu_memcpy"),
            EventCategory::MemoryOp
        );
        assert_eq!(
            EventCategory::from_trace_cat("user_annotation"),
            EventCategory::UserAnnotation
        );
    }

    #[test]
    fn amd_categories() {
        assert_eq!(
            EventCategory::from_trace_cat("hip_runtime"),
            EventCategory::Runtime
        );
        assert_eq!(
            EventCategory::from_trace_cat("hip_api"),
            EventCategory::Runtime
        );
        assert_eq!(
            EventCategory::from_trace_cat("gpu_sync"),
            EventCategory::DeviceSync
        );
    }

    #[test]
    fn unknown_category_is_other() {
        assert_eq!(
            EventCategory::from_trace_cat("python_function"),
            EventCategory::Other
        );
    }

    #[test]
    fn device_categories() {
        assert!(EventCategory::Kernel.is_device());
        assert!(EventCategory::MemoryOp.is_device());
        assert!(EventCategory::DeviceSync.is_device());
        assert!(!EventCategory::Runtime.is_device());
        assert!(!EventCategory::HostOp.is_device());
    }

    #[test]
    fn blocking_sync_kinds() {
        assert!(RuntimeSyncKind::EventSynchronize.is_blocking());
        assert!(RuntimeSyncKind::DeviceSynchronize.is_blocking());
        assert!(RuntimeSyncKind::StreamSynchronize.is_blocking());
        assert!(!RuntimeSyncKind::EventRecord.is_blocking());
        assert!(!RuntimeSyncKind::StreamWaitEvent.is_blocking());
    }

    #[test]
    fn sync_kind_cuda_and_hip() {
        assert_eq!(
            RuntimeSyncKind::classify("cudaEventRecord"),
            Some(RuntimeSyncKind::EventRecord)
        );
        assert_eq!(
            RuntimeSyncKind::classify("hipStreamWaitEvent"),
            Some(RuntimeSyncKind::StreamWaitEvent)
        );
        assert_eq!(
            RuntimeSyncKind::classify("cudaDeviceSynchronize"),
            Some(RuntimeSyncKind::DeviceSynchronize)
        );
        assert_eq!(RuntimeSyncKind::classify("cudaLaunchKernel"), None);
    }
}
