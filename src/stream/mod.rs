//! Binary edge-stream sources.
//!
//! A stream file is little-endian: a 12-byte header `[N: u32][M: u64]`
//! followed by `M` 9-byte records (`kind: u8`, `u: u32`, `v: u32`), so the
//! file is exactly `12 + 9*M` bytes.
//!
//! [`BinaryGraphStream`] is the plain single-reader source.
//! [`BinaryGraphStreamMt`] shares one file between any number of
//! [`MtStreamReader`] handles at block granularity and provides the
//! cooperative pause points the query protocol needs.

mod binary;
mod multi;

pub use binary::BinaryGraphStream;
pub use multi::{BinaryGraphStreamMt, MtStreamReader};

use crate::types::EDGE_RECORD_SIZE;

/// Round a requested buffer size down to a whole number of edge records,
/// keeping room for at least one.
pub(crate) fn aligned_buf_size(requested: usize) -> usize {
    let aligned = requested - requested % EDGE_RECORD_SIZE;
    aligned.max(EDGE_RECORD_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_alignment() {
        assert_eq!(aligned_buf_size(1024), 1017);
        assert_eq!(aligned_buf_size(9), 9);
        assert_eq!(aligned_buf_size(5), 9);
        assert_eq!(aligned_buf_size(18), 18);
    }
}
