//! Build configuration for the critical-path graph.
//!
//! The boundary (the CLI) may read environment variables or config files,
//! but the core only ever sees this explicit struct.

use serde::{Deserialize, Serialize};

/// Selects the iteration window to analyze.
///
/// An empty annotation selects the full trace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationSelector {
    /// Annotation name to look for; matched as a substring so profiler step
    /// markers with numeric suffixes (`ProfilerStep#1100`) are selectable by
    /// their stem.
    pub annotation: String,
    /// Which instance of the annotation to select, numbered in start-time
    /// order from zero.
    pub instance: u64,
}

impl IterationSelector {
    /// Selects the full trace.
    pub fn full_trace() -> Self {
        Self::default()
    }

    /// Selects the `instance`-th occurrence of `annotation`.
    pub fn instance(annotation: impl Into<String>, instance: u64) -> Self {
        Self {
            annotation: annotation.into(),
            instance,
        }
    }

    /// Returns `true` when this selector means the full trace.
    pub fn is_full_trace(&self) -> bool {
        self.annotation.is_empty()
    }
}

/// Configuration for one graph build.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalPathConfig {
    /// Emit an additional zero-weight `KernelLaunchDelay` edge from a launch
    /// call's start to its kernel's start, modeling that a kernel cannot
    /// begin before its launch started, independent of launch duration.
    pub add_zero_weight_launch_edge: bool,
    /// The iteration window to analyze.
    pub selector: IterationSelector,
    /// Host-event name patterns treated as data-loader work. When non-empty,
    /// matching events classify as `DataLoading` in the breakdown instead of
    /// `CpuBound`, and the summary gains that bucket.
    pub data_load_events: Vec<String>,
}

impl CriticalPathConfig {
    /// Configuration selecting the given iteration with all other options at
    /// their defaults.
    pub fn for_selector(selector: IterationSelector) -> Self {
        Self {
            selector,
            ..Self::default()
        }
    }
}
