//! Core graph-stream types: vertex/edge identifiers, updates, and the
//! 9-byte wire record.

use crate::error::{GraphError, Result};

/// Vertex identifier. Valid range is `[0, N)` for an `N`-vertex graph.
pub type NodeId = u32;

/// Packed edge identifier produced by [`edge_key`].
pub type EdgeId = u64;

/// Size of one binary edge record: 1 kind byte + two little-endian u32s.
pub const EDGE_RECORD_SIZE: usize = 9;

/// Size of the stream header: `[num_nodes: u32][num_updates: u64]`.
pub const STREAM_HEADER_SIZE: usize = 12;

/// An unordered pair of distinct vertices.
///
/// `src`/`dst` reflect the orientation the record was read with; the pair
/// itself is undirected. Use [`edge_key`] for an orientation-free identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub src: NodeId,
    pub dst: NodeId,
}

impl Edge {
    pub fn new(src: NodeId, dst: NodeId) -> Self {
        Self { src, dst }
    }
}

/// What an update does to the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UpdateKind {
    /// Add one copy of the edge.
    Insert = 0,
    /// Remove one copy of the edge.
    Delete = 1,
    /// Sentinel returned by stream readers when ingest is paused for a
    /// query or the stream is exhausted. Never appears on the wire.
    Breakpoint = 2,
}

/// A single stream update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphUpdate {
    pub edge: Edge,
    pub kind: UpdateKind,
}

impl GraphUpdate {
    pub fn insert(src: NodeId, dst: NodeId) -> Self {
        Self {
            edge: Edge::new(src, dst),
            kind: UpdateKind::Insert,
        }
    }

    pub fn delete(src: NodeId, dst: NodeId) -> Self {
        Self {
            edge: Edge::new(src, dst),
            kind: UpdateKind::Delete,
        }
    }

    pub(crate) fn breakpoint() -> Self {
        Self {
            edge: Edge::new(0, 0),
            kind: UpdateKind::Breakpoint,
        }
    }

    /// True for the reader pause sentinel.
    pub fn is_breakpoint(&self) -> bool {
        self.kind == UpdateKind::Breakpoint
    }

    /// Decode one 9-byte wire record: kind, then `src` and `dst` as
    /// little-endian u32.
    pub fn decode(buf: &[u8; EDGE_RECORD_SIZE]) -> Result<Self> {
        let kind = match buf[0] {
            0 => UpdateKind::Insert,
            1 => UpdateKind::Delete,
            k => {
                return Err(GraphError::StreamFailed(format!(
                    "invalid update kind byte {k}"
                )))
            }
        };
        let src = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]);
        let dst = u32::from_le_bytes([buf[5], buf[6], buf[7], buf[8]]);
        Ok(Self {
            edge: Edge::new(src, dst),
            kind,
        })
    }

    /// Encode to the 9-byte wire record. Panics on [`UpdateKind::Breakpoint`],
    /// which has no wire representation.
    pub fn encode(&self) -> [u8; EDGE_RECORD_SIZE] {
        let kind = match self.kind {
            UpdateKind::Insert => 0u8,
            UpdateKind::Delete => 1u8,
            UpdateKind::Breakpoint => panic!("breakpoint updates are not encodable"),
        };
        let mut buf = [0u8; EDGE_RECORD_SIZE];
        buf[0] = kind;
        buf[1..5].copy_from_slice(&self.edge.src.to_le_bytes());
        buf[5..9].copy_from_slice(&self.edge.dst.to_le_bytes());
        buf
    }
}

/// Concatenation pairing function: maps the unordered pair `{u, v}` to
/// `(min << 32) | max`. Orientation-free, so both endpoints of an edge
/// contribute the same key to their sketches and a supernode merge cancels
/// the shared edge.
#[inline]
pub fn edge_key(u: NodeId, v: NodeId) -> EdgeId {
    let (lo, hi) = if u < v { (u, v) } else { (v, u) };
    ((lo as u64) << 32) | hi as u64
}

/// Invert [`edge_key`]; `src <= dst` in the result.
#[inline]
pub fn split_edge_key(key: EdgeId) -> Edge {
    Edge {
        src: (key >> 32) as NodeId,
        dst: key as NodeId,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_key_ignores_orientation() {
        assert_eq!(edge_key(3, 7), edge_key(7, 3));
        assert_ne!(edge_key(3, 7), edge_key(3, 8));
    }

    #[test]
    fn edge_key_splits_back() {
        let e = split_edge_key(edge_key(9, 2));
        assert_eq!((e.src, e.dst), (2, 9));
    }

    #[test]
    fn record_codec() {
        let upd = GraphUpdate::delete(17, 400_000);
        let buf = upd.encode();
        assert_eq!(buf.len(), EDGE_RECORD_SIZE);
        assert_eq!(GraphUpdate::decode(&buf).unwrap(), upd);
    }

    #[test]
    fn record_decode_rejects_bad_kind() {
        let mut buf = GraphUpdate::insert(0, 1).encode();
        buf[0] = 9;
        assert!(GraphUpdate::decode(&buf).is_err());
    }
}
