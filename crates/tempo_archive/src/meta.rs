//! The `meta.json` sidecar describing a saved graph.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tempo_common::TraceFingerprint;
use tempo_graph::CriticalPathConfig;

use crate::error::ArchiveError;

/// Current archive format version. Increment on breaking changes to the
/// table row layout or this metadata structure.
pub const ARCHIVE_FORMAT_VERSION: u16 = 1;

/// Name of the metadata file within an archive directory.
pub(crate) const META_FILE: &str = "meta.json";

/// Everything needed to interpret the node and edge tables, plus enough
/// provenance to warn when a restored graph is paired with the wrong trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveMeta {
    /// Archive format version; must equal [`ARCHIVE_FORMAT_VERSION`].
    pub version: u16,
    /// Rank the graph was built for.
    pub rank: u32,
    /// Fingerprint of the source trace file.
    pub trace_fingerprint: TraceFingerprint,
    /// Configuration the graph was built with.
    pub config: CriticalPathConfig,
    /// The half-open iteration window `[t0, t1)`.
    pub window: (i64, i64),
    /// Raw index of the solver's source node.
    pub source: u32,
    /// Raw index of the solver's sink node.
    pub sink: u32,
    /// Expected number of rows in `nodes.tbl`.
    pub node_count: u64,
    /// Expected number of rows in `edges.tbl`.
    pub edge_count: u64,
    /// Indices of device-side events, sorted.
    pub device_events: Vec<u64>,
    /// Indices of data-loader events, sorted.
    pub data_load_events: Vec<u64>,
}

impl ArchiveMeta {
    /// Loads and validates metadata from an archive directory.
    pub fn load(dir: &Path) -> Result<Self, ArchiveError> {
        let path = dir.join(META_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| ArchiveError::Io {
            path: path.clone(),
            source: e,
        })?;
        let meta: ArchiveMeta =
            serde_json::from_str(&content).map_err(|e| ArchiveError::MetaParse {
                reason: e.to_string(),
            })?;
        if meta.version != ARCHIVE_FORMAT_VERSION {
            return Err(ArchiveError::VersionMismatch {
                expected: ARCHIVE_FORMAT_VERSION,
                actual: meta.version,
            });
        }
        Ok(meta)
    }

    /// Writes metadata into an archive directory.
    pub fn save(&self, dir: &Path) -> Result<(), ArchiveError> {
        let path = dir.join(META_FILE);
        let content = serde_json::to_string_pretty(self).map_err(|e| ArchiveError::MetaParse {
            reason: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ArchiveError::Io { path, source: e })
    }
}
