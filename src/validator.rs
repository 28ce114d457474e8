//! Size/existence check for converter output.

use std::path::Path;

/// Outputs at or below this size are treated as truncated.
pub const DEFAULT_MIN_SIZE_BYTES: u64 = 1024;

/// True iff `path` is a regular file strictly larger than `min_size` bytes.
pub fn is_valid(path: &Path, min_size: u64) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > min_size)
        .unwrap_or(false)
}
