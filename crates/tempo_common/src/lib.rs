//! Shared foundational types used across the Tempo trace analyzer.
//!
//! This crate provides interned event names, trace content fingerprints,
//! and the common result type for internal invariant violations.

#![warn(missing_docs)]

pub mod hash;
pub mod ident;
pub mod result;

pub use hash::TraceFingerprint;
pub use ident::{Ident, Interner};
pub use result::{InternalError, TempoResult};
