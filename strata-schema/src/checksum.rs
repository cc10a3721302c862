//! Deterministic structural checksums.
//!
//! Every hash in Strata is computed over name-sorted content. Two
//! processes observing the same structural state must agree on the same
//! checksum, so map iteration order and wall-clock time never feed the
//! hasher.

use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::snapshot::{ColumnInfo, ConstraintInfo, IndexInfo};

/// SHA-256 of `content`, hex-encoded.
pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Checksum over a model snapshot's contents.
pub fn snapshot_checksum(
    table_name: &str,
    columns: &IndexMap<String, ColumnInfo>,
    indexes: &BTreeMap<String, IndexInfo>,
    constraints: &BTreeMap<String, ConstraintInfo>,
) -> String {
    let mut lines = Vec::with_capacity(1 + columns.len() + indexes.len() + constraints.len());
    lines.push(format!("table:{}", table_name));

    let mut column_lines: Vec<String> = columns.values().map(ColumnInfo::fingerprint).collect();
    column_lines.sort();
    lines.extend(column_lines);

    // BTreeMap iteration is already name-sorted.
    lines.extend(indexes.values().map(IndexInfo::fingerprint));
    lines.extend(constraints.values().map(ConstraintInfo::fingerprint));

    sha256_hex(&lines.join("\n"))
}

/// Checksum over an ordered list of change fingerprints.
pub fn change_list_checksum(fingerprints: &[String]) -> String {
    sha256_hex(&fingerprints.join("\n"))
}
