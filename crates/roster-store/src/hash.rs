//! Content fingerprints.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use roster_model::RowHash;

use crate::error::Result;

/// SHA-256 over the canonical JSON encoding of a normalized row.
///
/// Keys are serialized in sorted order, so identical content always yields
/// the same hash regardless of how the map was built.
pub fn row_hash(normalized: &BTreeMap<String, String>) -> Result<RowHash> {
    let encoded = serde_json::to_vec(normalized)?;
    let digest = Sha256::digest(&encoded);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Ok(RowHash::from_digest(out))
}

/// Lowercase hex SHA-256 of an uploaded file.
pub fn content_checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
