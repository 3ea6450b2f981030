//! Row types and the gz + magic framing for `nodes.tbl` and `edges.tbl`.

use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempo_graph::EdgeCategory;

use crate::error::ArchiveError;

/// Magic prefix of every decompressed table payload.
pub(crate) const TABLE_MAGIC: [u8; 8] = *b"CPGRAPH\0";

/// One row of `nodes.tbl`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct NodeRow {
    /// Node index; rows are stored in index order.
    pub node_idx: u32,
    /// Originating event index.
    pub event_idx: u64,
    /// Start or end boundary.
    pub is_start: bool,
    /// Timestamp in nanoseconds.
    pub ts: i64,
    /// Position on the solved critical path, when the node was on it.
    pub path_pos: Option<u32>,
}

/// One row of `edges.tbl`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct EdgeRow {
    /// Source node index.
    pub src: u32,
    /// Target node index.
    pub dst: u32,
    /// Weight in nanoseconds.
    pub weight: u64,
    /// Edge category.
    pub category: EdgeCategory,
    /// Attributed event index, for weighted categories.
    pub attributed: Option<u64>,
    /// Whether the edge lies on the solved critical path.
    pub critical: bool,
}

/// Writes a table: magic + bincode rows, gz-compressed.
pub(crate) fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), ArchiveError> {
    let payload = bincode::serde::encode_to_vec(rows, bincode::config::standard()).map_err(
        |e| ArchiveError::Serialization {
            reason: e.to_string(),
        },
    )?;

    let file = std::fs::File::create(path).map_err(|e| ArchiveError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    let io_err = |e: std::io::Error| ArchiveError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    encoder.write_all(&TABLE_MAGIC).map_err(io_err)?;
    encoder.write_all(&payload).map_err(io_err)?;
    encoder.finish().map_err(io_err)?;
    Ok(())
}

/// Reads a table back, validating the magic prefix.
pub(crate) fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, ArchiveError> {
    let file = std::fs::File::open(path).map_err(|e| ArchiveError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut decoder = GzDecoder::new(file);
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw).map_err(|e| ArchiveError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    if raw.len() < TABLE_MAGIC.len() || raw[..TABLE_MAGIC.len()] != TABLE_MAGIC {
        return Err(ArchiveError::BadMagic {
            path: path.to_path_buf(),
        });
    }

    let (rows, _) =
        bincode::serde::decode_from_slice(&raw[TABLE_MAGIC.len()..], bincode::config::standard())
            .map_err(|e| ArchiveError::Serialization {
                reason: e.to_string(),
            })?;
    Ok(rows)
}
