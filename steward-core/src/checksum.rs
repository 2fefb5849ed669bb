//! Content checksums for delta files.
//!
//! The checksum recorded at apply time lets the status report flag deltas
//! edited after they reached the schema store.

use crc32fast::Hasher;

/// CRC32 over the content's lines with line endings stripped, as `i32`.
///
/// Line-based so that the same delta checked out with `\n` or `\r\n`
/// endings yields the same value.
pub fn calculate_checksum(content: &str) -> i32 {
    let mut hasher = Hasher::new();
    for line in content.lines() {
        hasher.update(line.as_bytes());
    }
    hasher.finalize() as i32
}

/// Whether `content` still matches a recorded checksum. A missing record matches.
pub fn matches_recorded(content: &str, recorded: Option<i32>) -> bool {
    recorded.map_or(true, |sum| sum == calculate_checksum(content))
}
