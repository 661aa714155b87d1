//! Single-reader binary edge stream.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{GraphError, Result};
use crate::stream::aligned_buf_size;
use crate::types::{GraphUpdate, EDGE_RECORD_SIZE, STREAM_HEADER_SIZE};

/// Buffered reader over a binary edge-stream file.
///
/// Delivers exactly `edges()` updates in file order via [`next_update`].
/// The internal buffer holds a whole number of records so no record ever
/// straddles a refill.
///
/// [`next_update`]: BinaryGraphStream::next_update
#[derive(Debug)]
pub struct BinaryGraphStream {
    file: File,
    buf: Vec<u8>,
    pos: usize,
    len: usize,
    num_nodes: u32,
    num_edges: u64,
}

impl BinaryGraphStream {
    /// Open a stream file with a buffer of roughly `buf_bytes` bytes.
    pub fn new(path: impl AsRef<Path>, buf_bytes: usize) -> Result<Self> {
        let path = path.as_ref();
        let bad = |source| GraphError::BadStream {
            path: path.display().to_string(),
            source,
        };
        let mut file = File::open(path).map_err(bad)?;

        let mut header = [0u8; STREAM_HEADER_SIZE];
        file.read_exact(&mut header).map_err(bad)?;
        let num_nodes = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let num_edges = u64::from_le_bytes(header[4..12].try_into().unwrap());

        Ok(Self {
            file,
            buf: vec![0u8; aligned_buf_size(buf_bytes)],
            pos: 0,
            len: 0,
            num_nodes,
            num_edges,
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

    /// Read the next update. Calling this more than `edges()` times reads
    /// past the declared stream and fails with `StreamFailed`.
    pub fn next_update(&mut self) -> Result<GraphUpdate> {
        if self.pos == self.len {
            self.refill()?;
            if self.len == 0 {
                return Err(GraphError::StreamFailed(
                    "read past the end of the stream".into(),
                ));
            }
        }
        let record: &[u8; EDGE_RECORD_SIZE] =
            self.buf[self.pos..self.pos + EDGE_RECORD_SIZE].try_into().unwrap();
        let upd = GraphUpdate::decode(record)?;
        self.pos += EDGE_RECORD_SIZE;
        Ok(upd)
    }

    /// Fill the buffer from the file, retrying short reads until the buffer
    /// is full or EOF. A partial record at EOF is a corrupt stream.
    fn refill(&mut self) -> Result<()> {
        self.pos = 0;
        self.len = 0;
        while self.len < self.buf.len() {
            match self.file.read(&mut self.buf[self.len..]) {
                Ok(0) => break,
                Ok(n) => self.len += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(GraphError::StreamFailed(e.to_string())),
            }
        }
        if self.len % EDGE_RECORD_SIZE != 0 {
            return Err(GraphError::StreamFailed(format!(
                "stream ends mid-record ({} trailing bytes)",
                self.len % EDGE_RECORD_SIZE
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UpdateKind;
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

    #[test]
    fn reads_header_and_updates_in_order() {
        let updates = vec![
            GraphUpdate::insert(0, 1),
            GraphUpdate::insert(1, 2),
            GraphUpdate::delete(0, 1),
        ];
        let f = write_stream(&updates, 3);

        // Tiny buffer forces refills between records.
        let mut stream = BinaryGraphStream::new(f.path(), 9).unwrap();
        assert_eq!(stream.nodes(), 3);
        assert_eq!(stream.edges(), 3);
        for expect in &updates {
            assert_eq!(stream.next_update().unwrap(), *expect);
        }
    }

    #[test]
    fn missing_file_is_bad_stream() {
        let err = BinaryGraphStream::new("/nonexistent/stream.bin", 1024).unwrap_err();
        assert!(matches!(err, GraphError::BadStream { .. }));
    }

    #[test]
    fn truncated_header_is_bad_stream() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[1, 2, 3]).unwrap();
        f.flush().unwrap();
        let err = BinaryGraphStream::new(f.path(), 1024).unwrap_err();
        assert!(matches!(err, GraphError::BadStream { .. }));
    }

    #[test]
    fn reading_past_declared_end_fails() {
        let f = write_stream(&[GraphUpdate::insert(0, 1)], 2);
        let mut stream = BinaryGraphStream::new(f.path(), 1024).unwrap();
        assert_eq!(stream.next_update().unwrap().kind, UpdateKind::Insert);
        assert!(stream.next_update().is_err());
    }
}
