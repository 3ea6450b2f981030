//! Error types for archive operations.

use std::path::PathBuf;

/// Errors raised while saving or restoring a graph archive.
///
/// Saves are written into a temporary directory and renamed into place, so a
/// failed save never corrupts an existing archive. Restores are strict: a
/// saved graph is an explicit user artifact, and any mismatch is an error
/// rather than a silent miss.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// An I/O error occurred while reading or writing archive files.
    #[error("archive I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A table payload does not start with the `CPGRAPH\0` magic.
    #[error("{path} is not a critical-path graph table")]
    BadMagic {
        /// The offending table file.
        path: PathBuf,
    },

    /// The archive was produced by an incompatible format version.
    #[error("archive format version {actual} is not supported (expected {expected})")]
    VersionMismatch {
        /// The version this build reads and writes.
        expected: u16,
        /// The version found in `meta.json`.
        actual: u16,
    },

    /// `meta.json` could not be parsed.
    #[error("failed to parse archive metadata: {reason}")]
    MetaParse {
        /// Description of the parse failure.
        reason: String,
    },

    /// A serialization or deserialization failure in a table.
    #[error("archive serialization error: {reason}")]
    Serialization {
        /// Description of the failure.
        reason: String,
    },

    /// The archived parts do not assemble into a valid graph.
    #[error("archive is corrupt: {reason}")]
    Corrupt {
        /// Description of the inconsistency.
        reason: String,
    },
}
