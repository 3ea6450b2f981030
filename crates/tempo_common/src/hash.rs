//! Content fingerprints identifying source traces inside saved graph archives.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;

/// A 128-bit content fingerprint computed with XXH3.
///
/// A saved critical-path graph records the fingerprint of the trace it was
/// built from. On restore, a mismatching fingerprint means event names
/// resolved against the supplied trace are unreliable; the graph itself is
/// still usable because solving never consults the event table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceFingerprint([u8; 16]);

impl TraceFingerprint {
    /// Computes a fingerprint over an in-memory byte slice.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }

    /// Computes a fingerprint by streaming a reader to its end.
    ///
    /// Trace files run to hundreds of megabytes decompressed, so the hash is
    /// fed in fixed-size chunks rather than buffering the whole file.
    pub fn from_reader<R: Read>(mut reader: R) -> std::io::Result<Self> {
        let mut hasher = xxhash_rust::xxh3::Xxh3::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hasher.digest128().to_le_bytes()))
    }
}

impl fmt::Display for TraceFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TraceFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceFingerprint({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}
