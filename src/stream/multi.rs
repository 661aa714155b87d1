//! Multi-reader binary edge stream with cooperative query barriers.

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{GraphError, Result};
use crate::stream::aligned_buf_size;
use crate::types::{GraphUpdate, EDGE_RECORD_SIZE, STREAM_HEADER_SIZE};

/// Sentinel for "no query registered".
const NO_QUERY: u64 = u64::MAX;

/// A binary edge stream shared by many [`MtStreamReader`] handles.
///
/// Readers pull fixed-size blocks from one file through positioned reads;
/// a `fetch_add` on the shared offset claims each block, so every record is
/// delivered to exactly one reader. Two pause mechanisms make readers
/// return a breakpoint update:
///
/// - [`on_demand_query`]: pause everywhere within one block of progress.
/// - [`register_query`]: pause precisely at a pre-announced update index.
///
/// In both modes the caller must wait until every reader has returned a
/// breakpoint before querying the graph, and must call
/// [`post_query_resume`] afterwards. The stream does not verify the wait.
///
/// [`on_demand_query`]: BinaryGraphStreamMt::on_demand_query
/// [`register_query`]: BinaryGraphStreamMt::register_query
/// [`post_query_resume`]: BinaryGraphStreamMt::post_query_resume
pub struct BinaryGraphStreamMt {
    file: File,
    num_nodes: u32,
    num_edges: u64,
    buf_size: usize,
    end_of_file: u64,
    /// Next unread byte offset; readers claim blocks with `fetch_add`.
    stream_off: AtomicU64,
    /// Byte offset of the pending registered query, `NO_QUERY` if none.
    query_index: AtomicU64,
    /// Pause flag set by on-demand queries.
    query_block: AtomicBool,
}

impl BinaryGraphStreamMt {
    /// Open a stream file. Each reader gets a private buffer of
    /// `buf_bytes` rounded down to a whole number of records.
    pub fn new(path: impl AsRef<Path>, buf_bytes: usize) -> Result<Self> {
        let path = path.as_ref();
        let bad = |source| GraphError::BadStream {
            path: path.display().to_string(),
            source,
        };
        let file = File::open(path).map_err(bad)?;

        let mut header = [0u8; STREAM_HEADER_SIZE];
        file.read_exact_at(&mut header, 0).map_err(bad)?;
        let num_nodes = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let num_edges = u64::from_le_bytes(header[4..12].try_into().unwrap());

        Ok(Self {
            file,
            num_nodes,
            num_edges,
            buf_size: aligned_buf_size(buf_bytes),
            end_of_file: STREAM_HEADER_SIZE as u64 + num_edges * EDGE_RECORD_SIZE as u64,
            stream_off: AtomicU64::new(STREAM_HEADER_SIZE as u64),
            query_index: AtomicU64::new(NO_QUERY),
            query_block: AtomicBool::new(false),
        })
    }

    /// Number of vertices declared in the header.
    pub fn nodes(&self) -> u32 {
        self.num_nodes
    }

    /// Number of updates declared in the header.
    pub fn edges(&self) -> u64 {
        self.num_edges
    }

    /// Create a reader handle with its own block buffer.
    pub fn reader(&self) -> MtStreamReader<'_> {
        MtStreamReader {
            stream: self,
            buf: vec![0u8; self.buf_size],
            pos: 0,
            len: 0,
        }
    }

    /// Ask the stream to pause so a query can run. Every reader returns a
    /// breakpoint within at most one buffer of further progress.
    pub fn on_demand_query(&self) {
        self.query_block.store(true, Ordering::Release);
    }

    /// Register a query directly after update index `query_idx`. Readers
    /// stop exactly at that boundary. Returns `false` if the stream has
    /// already read at or past the boundary.
    ///
    /// Only one query may be registered at a time; re-register after
    /// [`post_query_resume`](Self::post_query_resume).
    pub fn register_query(&self, query_idx: u64) -> bool {
        let byte_index = STREAM_HEADER_SIZE as u64 + query_idx * EDGE_RECORD_SIZE as u64;
        if byte_index <= self.stream_off.load(Ordering::Acquire) {
            return false;
        }
        self.query_index.store(byte_index, Ordering::Release);
        true
    }

    /// Clear query state so readers may continue. Call once per query,
    /// for both on-demand and registered queries.
    pub fn post_query_resume(&self) {
        self.query_block.store(false, Ordering::Release);
        self.query_index.store(NO_QUERY, Ordering::Release);
    }

    /// Rewind the shared offset to the first record.
    pub fn reset(&self) {
        self.stream_off
            .store(STREAM_HEADER_SIZE as u64, Ordering::Release);
    }

    /// Claim and read one block into `buf`. Returns the byte count read, or
    /// 0 to signal a breakpoint (query pending, boundary reached, or EOF).
    fn read_block(&self, buf: &mut [u8]) -> Result<usize> {
        let buf_size = self.buf_size as u64;

        if self.query_block.load(Ordering::Acquire)
            || self.stream_off.load(Ordering::Acquire) >= self.end_of_file
            || self.stream_off.load(Ordering::Acquire) >= self.query_index.load(Ordering::Acquire)
        {
            return Ok(0);
        }

        let read_off = self.stream_off.fetch_add(buf_size, Ordering::Relaxed);

        // Several readers may have raced past a newly registered query or
        // EOF between the check above and the fetch_add.
        let query_index = self.query_index.load(Ordering::Acquire);
        if read_off >= query_index {
            self.stream_off.store(query_index, Ordering::Release);
            return Ok(0);
        }
        if read_off >= self.end_of_file {
            return Ok(0);
        }

        let mut data_to_read = buf_size;
        if query_index >= read_off && query_index < read_off + buf_size {
            // Query boundary truncates the block.
            data_to_read = query_index - read_off;
            self.stream_off.store(query_index, Ordering::Release);
        }
        if read_off + data_to_read > self.end_of_file {
            data_to_read = self.end_of_file - read_off;
        }

        let data_to_read = data_to_read as usize;
        let mut data_read = 0usize;
        while data_read < data_to_read {
            match self
                .file
                .read_at(&mut buf[data_read..data_to_read], read_off + data_read as u64)
            {
                Ok(0) => {
                    return Err(GraphError::StreamFailed(
                        "unexpected EOF inside a stream block".into(),
                    ))
                }
                Ok(n) => data_read += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(GraphError::StreamFailed(e.to_string())),
            }
        }
        Ok(data_to_read)
    }
}

/// Single-thread handle onto a [`BinaryGraphStreamMt`].
pub struct MtStreamReader<'a> {
    stream: &'a BinaryGraphStreamMt,
    buf: Vec<u8>,
    pos: usize,
    len: usize,
}

impl MtStreamReader<'_> {
    /// Read the next update from this reader's block range.
    ///
    /// Returns a [`Breakpoint`](crate::types::UpdateKind::Breakpoint)
    /// update when the stream is paused for a query or exhausted; after
    /// [`BinaryGraphStreamMt::post_query_resume`] the same reader may keep
    /// calling `get_edge`.
    pub fn get_edge(&mut self) -> Result<GraphUpdate> {
        if self.pos >= self.len {
            self.len = self.stream.read_block(&mut self.buf)?;
            if self.len == 0 {
                return Ok(GraphUpdate::breakpoint());
            }
            self.pos = 0;
        }
        let record: &[u8; EDGE_RECORD_SIZE] =
            self.buf[self.pos..self.pos + EDGE_RECORD_SIZE].try_into().unwrap();
        let upd = GraphUpdate::decode(record)?;
        self.pos += EDGE_RECORD_SIZE;
        Ok(upd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_stream(updates: &[GraphUpdate], num_nodes: u32) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&num_nodes.to_le_bytes()).unwrap();
        f.write_all(&(updates.len() as u64).to_le_bytes()).unwrap();
        for u in updates {
            f.write_all(&u.encode()).unwrap();
        }
        f.flush().unwrap();
        f
    }

    fn updates(n: u32) -> Vec<GraphUpdate> {
        (0..n).map(|i| GraphUpdate::insert(i, i + 1)).collect()
    }

    #[test]
    fn single_reader_drains_file_then_breaks() {
        let upds = updates(10);
        let f = write_stream(&upds, 11);
        let stream = BinaryGraphStreamMt::new(f.path(), 27).unwrap();
        assert_eq!(stream.nodes(), 11);
        assert_eq!(stream.edges(), 10);

        let mut reader = stream.reader();
        for expect in &upds {
            assert_eq!(reader.get_edge().unwrap(), *expect);
        }
        assert!(reader.get_edge().unwrap().is_breakpoint());
        // Exhaustion is sticky.
        assert!(reader.get_edge().unwrap().is_breakpoint());
    }

    #[test]
    fn on_demand_query_pauses_and_resumes() {
        let upds = updates(6);
        let f = write_stream(&upds, 7);
        let stream = BinaryGraphStreamMt::new(f.path(), 18).unwrap();
        let mut reader = stream.reader();

        // Drain the first claimed block, then pause.
        assert!(!reader.get_edge().unwrap().is_breakpoint());
        assert!(!reader.get_edge().unwrap().is_breakpoint());
        stream.on_demand_query();
        assert!(reader.get_edge().unwrap().is_breakpoint());

        stream.post_query_resume();
        let mut rest = 0;
        while !reader.get_edge().unwrap().is_breakpoint() {
            rest += 1;
        }
        assert_eq!(rest, 4);
    }

    #[test]
    fn register_query_stops_at_boundary() {
        let upds = updates(8);
        let f = write_stream(&upds, 9);
        let stream = BinaryGraphStreamMt::new(f.path(), 18).unwrap();
        assert!(stream.register_query(3));

        let mut reader = stream.reader();
        let mut seen = Vec::new();
        loop {
            let upd = reader.get_edge().unwrap();
            if upd.is_breakpoint() {
                break;
            }
            seen.push(upd);
        }
        assert_eq!(seen, upds[..3]);

        stream.post_query_resume();
        let mut rest = Vec::new();
        loop {
            let upd = reader.get_edge().unwrap();
            if upd.is_breakpoint() {
                break;
            }
            rest.push(upd);
        }
        assert_eq!(rest, upds[3..]);
    }

    #[test]
    fn register_query_rejects_passed_offsets() {
        let upds = updates(4);
        let f = write_stream(&upds, 5);
        let stream = BinaryGraphStreamMt::new(f.path(), 1024).unwrap();

        // Index 0 is never strictly ahead of the initial offset.
        assert!(!stream.register_query(0));

        let mut reader = stream.reader();
        reader.get_edge().unwrap(); // claims the whole file in one block
        assert!(!stream.register_query(2));
    }

    #[test]
    fn reset_rewinds_the_shared_offset() {
        let upds = updates(3);
        let f = write_stream(&upds, 4);
        let stream = BinaryGraphStreamMt::new(f.path(), 1024).unwrap();

        let mut reader = stream.reader();
        while !reader.get_edge().unwrap().is_breakpoint() {}
        stream.reset();
        let mut reader = stream.reader();
        assert_eq!(reader.get_edge().unwrap(), upds[0]);
    }
}
