//! Chunk plan: range math covering a file in fixed-size, resumable entries.
//!
//! The plan is computed once from the declared total size and a chunk size,
//! and never resized afterwards. An entry is "filled" once its data length
//! equals its range length; filled entries are the unit of resume.

use serde::{Deserialize, Serialize};

/// Inclusive byte range `[start, end]`, the addressing unit of one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Length of this range in bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }

    /// HTTP Range header value: `bytes=start-end`.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// One entry of a task's chunk plan.
///
/// `data` is empty until fetched, then holds exactly `end - start + 1` bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// 0-based, dense, contiguous index within the plan.
    pub index: usize,
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (inclusive).
    pub end: u64,
    /// Fetched bytes, empty while the entry is unfilled.
    pub data: Vec<u8>,
}

impl Chunk {
    /// The byte range this entry addresses.
    pub fn range(&self) -> ByteRange {
        ByteRange {
            start: self.start,
            end: self.end,
        }
    }

    /// Range length in bytes.
    pub fn len(&self) -> u64 {
        self.range().len()
    }

    /// True once the fetched data covers the whole range.
    pub fn is_filled(&self) -> bool {
        self.data.len() as u64 == self.len()
    }
}

/// Builds the chunk plan for `total` bytes in `chunk_size`-byte entries.
///
/// Entries are gapless and cover exactly `[0, total)`; the last entry may be
/// shorter. Returns an empty plan if `total` or `chunk_size` is 0.
pub fn plan_chunks(total: u64, chunk_size: u64) -> Vec<Chunk> {
    if total == 0 || chunk_size == 0 {
        return Vec::new();
    }

    let count = total.div_ceil(chunk_size) as usize;
    let mut out = Vec::with_capacity(count);
    let mut start = 0u64;
    let mut index = 0usize;

    while start < total {
        let end = (start + chunk_size).min(total) - 1;
        out.push(Chunk {
            index,
            start,
            end,
            data: Vec::new(),
        });
        start = end + 1;
        index += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_chunks_even() {
        let chunks = plan_chunks(1000, 250);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, 249);
        assert_eq!(chunks[3].start, 750);
        assert_eq!(chunks[3].end, 999);
    }

    #[test]
    fn plan_chunks_short_tail() {
        let chunks = plan_chunks(1000, 300);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[3].start, 900);
        assert_eq!(chunks[3].end, 999);
        assert_eq!(chunks[3].len(), 100);
    }

    #[test]
    fn plan_chunks_gapless_cover() {
        let chunks = plan_chunks(12345, 1024);
        let mut expected_start = 0u64;
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
            assert_eq!(c.start, expected_start);
            expected_start = c.end + 1;
        }
        assert_eq!(expected_start, 12345);
    }

    #[test]
    fn plan_chunks_single() {
        let chunks = plan_chunks(1024, 1024);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, 1023);
    }

    #[test]
    fn plan_chunks_empty() {
        assert!(plan_chunks(0, 1024).is_empty());
        assert!(plan_chunks(1024, 0).is_empty());
    }

    #[test]
    fn chunk_filled_only_when_data_matches_len() {
        let mut c = plan_chunks(100, 100).remove(0);
        assert!(!c.is_filled());
        c.data = vec![0u8; 99];
        assert!(!c.is_filled());
        c.data = vec![0u8; 100];
        assert!(c.is_filled());
    }

    #[test]
    fn range_header() {
        let r = ByteRange { start: 0, end: 98 };
        assert_eq!(r.header_value(), "bytes=0-98");
        assert_eq!(r.len(), 99);
        let single = ByteRange { start: 42, end: 42 };
        assert_eq!(single.header_value(), "bytes=42-42");
        assert_eq!(single.len(), 1);
    }
}
