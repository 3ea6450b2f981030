//! Save and restore of critical-path graphs.
//!
//! A saved graph is a self-contained directory with three artifacts:
//! `nodes.tbl` and `edges.tbl` (gzip streams whose payload starts with the
//! `CPGRAPH\0` magic followed by bincode-encoded rows) and `meta.json`
//! (format version, rank, source-trace fingerprint, build configuration,
//! iteration window). Restoring reconstructs the full graph — including the
//! previously solved critical path — without the original event table; the
//! table is only needed again to resolve names in summaries.

#![warn(missing_docs)]

pub mod archive;
pub mod error;
pub mod meta;
mod tables;

pub use archive::{restore_graph, save_graph};
pub use error::ArchiveError;
pub use meta::{ArchiveMeta, ARCHIVE_FORMAT_VERSION};
