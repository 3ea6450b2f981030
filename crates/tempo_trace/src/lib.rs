//! Trace loading and the event data model for the Tempo analyzer.
//!
//! A [`Trace`] is the parsed event table for one rank: a flat `Vec<Event>`
//! with interned names, normalized categories, integer-nanosecond timestamps,
//! and a correlation index linking device kernels to the runtime calls that
//! launched them. The loader accepts chrome-trace JSON, optionally
//! gz-compressed, from both NVIDIA and AMD profilers; vendor differences are
//! normalized at parse time so everything downstream is vendor-agnostic.

#![warn(missing_docs)]

pub mod event;
pub mod loader;
pub mod trace;

pub use event::{Event, EventCategory, RuntimeSyncKind};
pub use loader::{is_indexable_event, load_trace_dir, load_trace_file, trace_files, LoadError};
pub use trace::Trace;
