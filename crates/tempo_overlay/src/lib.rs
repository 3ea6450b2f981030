//! Overlaid-trace emission.
//!
//! Rewrites an input trace file with the critical-path analysis drawn on
//! top: events on the critical path get `args.critical = 1`, and graph edges
//! become chrome-trace flow arrows (`ph "s"`/`"f"`) typed
//! `critical_path_<category>` so the dependency structure is visible in a
//! trace viewer.

#![warn(missing_docs)]

pub mod overlay;

pub use overlay::{overlay_critical_path, OverlayError, OverlayOptions};
