//! Chunked transfer reassembly
//!
//! Data sets larger than one packet move in chunks. A [`PendingTransfer`]
//! collects chunks keyed by byte offset, in any order, and only releases the
//! payload once every byte of the announced size is present.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Outcome of accepting a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    /// Chunk filled a gap
    New,
    /// Exact duplicate of a chunk already held
    Duplicate,
}

/// A transfer in progress
#[derive(Debug, Clone)]
pub struct PendingTransfer {
    expected: u32,
    chunks: BTreeMap<u32, Bytes>,
    received: u32,
    chunk_index: u32,
}

impl PendingTransfer {
    /// Start a transfer of `expected` bytes
    pub fn new(expected: u32) -> Self {
        Self {
            expected,
            chunks: BTreeMap::new(),
            received: 0,
            chunk_index: 0,
        }
    }

    /// Announced total size
    pub fn expected_size(&self) -> u32 {
        self.expected
    }

    /// Bytes held so far
    pub fn received(&self) -> u32 {
        self.received
    }

    /// Number of distinct chunks accepted
    pub fn chunk_index(&self) -> u32 {
        self.chunk_index
    }

    /// Whether a chunk starting at `offset` is already held
    pub fn has(&self, offset: u32) -> bool {
        self.chunks.contains_key(&offset)
    }

    /// Accept a chunk at a byte offset
    ///
    /// # Errors
    ///
    /// - [`Error::ChunkOutOfRange`] if the chunk is empty or ends past the announced size
    /// - [`Error::ChunkOverlap`] if it overlaps a different chunk already held
    pub fn accept_at(&mut self, offset: u32, data: Bytes) -> Result<Accepted> {
        let len = data.len();
        let end = u64::from(offset) + len as u64;
        if len == 0 || end > u64::from(self.expected) {
            return Err(Error::ChunkOutOfRange {
                offset,
                len,
                total: self.expected,
            });
        }
        let end = end as u32;

        if let Some(held) = self.chunks.get(&offset) {
            if *held == data {
                trace!(offset, len, "Duplicate chunk ignored");
                return Ok(Accepted::Duplicate);
            }
            return Err(Error::ChunkOverlap { offset });
        }

        if let Some((&prev_offset, prev)) = self.chunks.range(..offset).next_back() {
            if prev_offset + prev.len() as u32 > offset {
                return Err(Error::ChunkOverlap { offset });
            }
        }
        if let Some((&next_offset, _)) = self.chunks.range(offset..).next() {
            if next_offset < end {
                return Err(Error::ChunkOverlap { offset });
            }
        }

        self.chunks.insert(offset, data);
        self.received += len as u32;
        self.chunk_index += 1;

        trace!(
            offset,
            len,
            received = self.received,
            expected = self.expected,
            "Chunk accepted"
        );

        Ok(Accepted::New)
    }

    /// Append a chunk directly after the bytes received so far
    pub fn push(&mut self, data: Bytes) -> Result<Accepted> {
        let offset = self.first_gap().map_or(self.expected, |(start, _)| start);
        self.accept_at(offset, data)
    }

    /// First missing byte range as `(start, len)`
    pub fn first_gap(&self) -> Option<(u32, u32)> {
        let mut cursor = 0u32;
        for (&offset, chunk) in &self.chunks {
            if offset > cursor {
                return Some((cursor, offset - cursor));
            }
            cursor = offset + chunk.len() as u32;
        }
        (cursor < self.expected).then(|| (cursor, self.expected - cursor))
    }

    /// All bytes present
    pub fn is_complete(&self) -> bool {
        self.received == self.expected
    }

    /// Release the reassembled payload
    ///
    /// # Errors
    ///
    /// [`Error::TransferIncomplete`] while any byte is missing.
    pub fn finish(self) -> Result<Bytes> {
        if !self.is_complete() {
            return Err(Error::TransferIncomplete {
                received: self.received,
                expected: self.expected,
            });
        }

        let mut out = BytesMut::with_capacity(self.expected as usize);
        for chunk in self.chunks.into_values() {
            out.extend_from_slice(&chunk);
        }

        debug!(size = out.len(), chunks = self.chunk_index, "Transfer complete");
        Ok(out.freeze())
    }
}

/// One planned READ_BUFFER request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRequest {
    /// Position of the chunk in the plan
    pub index: u32,
    /// Byte offset
    pub start: u32,
    /// Byte count
    pub size: u32,
}

/// Splits a total size into fixed-width chunk requests
///
/// ```
/// use zkwire_core::transfer::ChunkPlan;
///
/// let sizes: Vec<u32> = ChunkPlan::new(10, 4).map(|c| c.size).collect();
/// assert_eq!(sizes, vec![4, 4, 2]);
/// ```
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    total: u32,
    chunk_size: u32,
    next: u32,
    index: u32,
}

impl ChunkPlan {
    /// Plan `total` bytes in chunks of at most `chunk_size` (minimum 1)
    pub fn new(total: u32, chunk_size: u32) -> Self {
        Self {
            total,
            chunk_size: chunk_size.max(1),
            next: 0,
            index: 0,
        }
    }

    /// Number of chunks in the plan
    pub fn len(&self) -> u32 {
        self.total.div_ceil(self.chunk_size)
    }

    /// Plan covers zero bytes
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

impl Iterator for ChunkPlan {
    type Item = ChunkRequest;

    fn next(&mut self) -> Option<ChunkRequest> {
        if self.next >= self.total {
            return None;
        }
        let size = self.chunk_size.min(self.total - self.next);
        let request = ChunkRequest {
            index: self.index,
            start: self.next,
            size,
        };
        self.next += size;
        self.index += 1;
        Some(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bytes(data: &[u8]) -> Bytes {
        Bytes::copy_from_slice(data)
    }

    #[test]
    fn test_in_order_chunks() {
        let mut transfer = PendingTransfer::new(6);
        transfer.push(bytes(b"abc")).unwrap();
        transfer.push(bytes(b"def")).unwrap();

        assert!(transfer.is_complete());
        assert_eq!(&transfer.finish().unwrap()[..], b"abcdef");
    }

    #[test]
    fn test_out_of_order_and_duplicate() {
        let mut transfer = PendingTransfer::new(9);

        assert_eq!(transfer.accept_at(6, bytes(b"ghi")).unwrap(), Accepted::New);
        assert_eq!(transfer.accept_at(0, bytes(b"abc")).unwrap(), Accepted::New);
        assert_eq!(transfer.accept_at(6, bytes(b"ghi")).unwrap(), Accepted::Duplicate);
        assert_eq!(transfer.first_gap(), Some((3, 3)));

        transfer.accept_at(3, bytes(b"def")).unwrap();
        assert_eq!(transfer.chunk_index(), 3);
        assert_eq!(&transfer.finish().unwrap()[..], b"abcdefghi");
    }

    #[test]
    fn test_overlap_rejected() {
        let mut transfer = PendingTransfer::new(10);
        transfer.accept_at(0, bytes(b"abcd")).unwrap();

        assert!(matches!(
            transfer.accept_at(2, bytes(b"xx")),
            Err(Error::ChunkOverlap { offset: 2 })
        ));
        assert!(matches!(
            transfer.accept_at(0, bytes(b"zzzz")),
            Err(Error::ChunkOverlap { offset: 0 })
        ));

        transfer.accept_at(6, bytes(b"gh")).unwrap();
        assert!(matches!(
            transfer.accept_at(5, bytes(b"xx")),
            Err(Error::ChunkOverlap { offset: 5 })
        ));
        assert_eq!(transfer.received(), 6);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut transfer = PendingTransfer::new(4);

        assert!(matches!(
            transfer.accept_at(2, bytes(b"abc")),
            Err(Error::ChunkOutOfRange { offset: 2, len: 3, total: 4 })
        ));
        assert!(matches!(
            transfer.accept_at(0, Bytes::new()),
            Err(Error::ChunkOutOfRange { .. })
        ));
        assert!(matches!(
            transfer.push(bytes(b"abcde")),
            Err(Error::ChunkOutOfRange { .. })
        ));
    }

    #[test]
    fn test_incomplete_exposes_nothing() {
        let mut transfer = PendingTransfer::new(8);
        transfer.accept_at(0, bytes(b"abcd")).unwrap();

        assert!(matches!(
            transfer.finish(),
            Err(Error::TransferIncomplete { received: 4, expected: 8 })
        ));
    }

    #[test]
    fn test_empty_transfer_is_complete() {
        let transfer = PendingTransfer::new(0);
        assert_eq!(transfer.first_gap(), None);
        assert!(transfer.finish().unwrap().is_empty());
    }

    #[test]
    fn test_chunk_plan() {
        let plan: Vec<_> = ChunkPlan::new(0x1_0000, 0xFFC0).collect();

        assert_eq!(
            plan,
            vec![
                ChunkRequest { index: 0, start: 0, size: 0xFFC0 },
                ChunkRequest { index: 1, start: 0xFFC0, size: 0x40 },
            ]
        );
        assert_eq!(ChunkPlan::new(100, 20).len(), 5);
        assert!(ChunkPlan::new(0, 20).is_empty());
    }
}
