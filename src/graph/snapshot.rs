//! Sketch snapshots: `write_binary`, the reheat constructor, and the
//! pre-query backup/restore used by continuing queries.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::GraphConfiguration;
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::sketch::Supernode;
use crate::types::NodeId;

const SNAPSHOT_MAGIC: [u8; 4] = *b"FRSH";
const SNAPSHOT_VERSION: u32 = 1;

/// Where the pre-query sketch copy lives.
pub(crate) enum SupernodeBackup {
    Mem(Vec<Supernode>),
    Disk(PathBuf),
}

impl Graph {
    /// Serialise the sketch state to `path`, flushing pending updates
    /// first. The file can rebuild an equivalent engine via
    /// [`new_from_file`](Self::new_from_file).
    pub fn write_binary(&self, path: impl AsRef<Path>) -> Result<()> {
        self.gutter.force_flush();
        let file = File::create(path.as_ref())?;
        let mut w = BufWriter::new(file);
        write_header(&mut w, self.nodes(), self.table.seed)?;
        for cell in &self.table.cells {
            cell.lock().write_to(&mut w)?;
        }
        w.flush()?;
        Ok(())
    }

    /// Rebuild an engine from a [`write_binary`](Self::write_binary)
    /// snapshot. The DSU starts invalid, so the first query recomputes
    /// components from the sketches.
    pub fn new_from_file(path: impl AsRef<Path>, config: GraphConfiguration) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| GraphError::BadStream {
            path: path.display().to_string(),
            source,
        })?;
        let mut r = BufReader::new(file);
        let (num_nodes, seed) = read_header(&mut r)?;
        let supernodes = read_supernodes(&mut r, num_nodes, seed)?;
        debug!(num_nodes, "reheated sketches from snapshot");
        Self::assemble(num_nodes, Some((seed, supernodes)), config, false)
    }

    /// Copy every supernode, to memory or to `disk_dir`, before a query
    /// mutates them.
    pub(crate) fn backup_supernodes(&self) -> Result<SupernodeBackup> {
        if self.config.get_backup_in_mem() {
            return Ok(SupernodeBackup::Mem(
                self.table.cells.iter().map(|c| c.lock().clone()).collect(),
            ));
        }
        let dir = self.config.get_disk_dir();
        std::fs::create_dir_all(dir)?;
        let path = dir.join("supernode_backup.bin");
        self.write_binary(&path)?;
        Ok(SupernodeBackup::Disk(path))
    }

    /// Put the pre-query copies back into the live table.
    pub(crate) fn restore_supernodes(&self, backup: SupernodeBackup) -> Result<()> {
        let supernodes = match backup {
            SupernodeBackup::Mem(supernodes) => supernodes,
            SupernodeBackup::Disk(path) => {
                let file = File::open(&path)?;
                let mut r = BufReader::new(file);
                let (num_nodes, seed) = read_header(&mut r)?;
                if num_nodes != self.nodes() || seed != self.table.seed {
                    return Err(GraphError::SnapshotFormat(
                        "backup does not match this graph".into(),
                    ));
                }
                read_supernodes(&mut r, num_nodes, seed)?
            }
        };
        for (cell, restored) in self.table.cells.iter().zip(supernodes) {
            *cell.lock() = restored;
        }
        Ok(())
    }
}

fn write_header<W: Write>(w: &mut W, num_nodes: NodeId, seed: u64) -> Result<()> {
    w.write_all(&SNAPSHOT_MAGIC)?;
    w.write_all(&SNAPSHOT_VERSION.to_le_bytes())?;
    w.write_all(&num_nodes.to_le_bytes())?;
    w.write_all(&seed.to_le_bytes())?;
    Ok(())
}

fn read_header<R: Read>(r: &mut R) -> Result<(NodeId, u64)> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if magic != SNAPSHOT_MAGIC {
        return Err(GraphError::SnapshotFormat("bad magic bytes".into()));
    }
    let mut buf4 = [0u8; 4];
    r.read_exact(&mut buf4)?;
    let version = u32::from_le_bytes(buf4);
    if version != SNAPSHOT_VERSION {
        return Err(GraphError::SnapshotFormat(format!(
            "unsupported snapshot version {version}"
        )));
    }
    r.read_exact(&mut buf4)?;
    let num_nodes = u32::from_le_bytes(buf4);
    let mut buf8 = [0u8; 8];
    r.read_exact(&mut buf8)?;
    Ok((num_nodes, u64::from_le_bytes(buf8)))
}

fn read_supernodes<R: Read>(r: &mut R, num_nodes: NodeId, seed: u64) -> Result<Vec<Supernode>> {
    (0..num_nodes)
        .map(|_| Supernode::read_from(r, num_nodes, seed).map_err(GraphError::from))
        .collect()
}
