//! The streaming graph engine.
//!
//! A [`Graph`] owns one supernode per vertex, a disjoint-set union over
//! the vertices, and a guttering system that batches updates on their way
//! into the sketches. Ingest threads call [`update`]; the controlling
//! thread calls [`point_query`] or [`connected_components`].
//!
//! With the eager DSU enabled (default), insertions maintain a live
//! spanning forest so point queries answer from the DSU alone. The first
//! deletion, or an insertion that closes a cycle against the recorded
//! forest, permanently invalidates the DSU until the next full
//! connected-components run rebuilds it from the sketches.
//!
//! [`update`]: Graph::update
//! [`point_query`]: Graph::point_query
//! [`connected_components`]: Graph::connected_components

mod boruvka;
mod snapshot;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::GraphConfiguration;
use crate::dsu::DisjointSets;
use crate::error::{GraphError, Result};
use crate::gutter::{BatchHandler, GutteringSystem};
use crate::sketch::Supernode;
use crate::types::{GraphUpdate, NodeId, UpdateKind};

/// Process-wide guard: only one engine may exist at a time.
static OPEN_GRAPH: AtomicBool = AtomicBool::new(false);

/// The live supernodes, shared between the engine and the gutter workers.
pub(crate) struct SupernodeTable {
    num_nodes: NodeId,
    seed: u64,
    cells: Vec<Mutex<Supernode>>,
}

impl SupernodeTable {
    fn new(num_nodes: NodeId, seed: u64) -> Self {
        Self {
            num_nodes,
            seed,
            cells: (0..num_nodes)
                .map(|_| Mutex::new(Supernode::new(num_nodes, seed)))
                .collect(),
        }
    }

    fn from_supernodes(num_nodes: NodeId, seed: u64, supernodes: Vec<Supernode>) -> Self {
        debug_assert_eq!(supernodes.len(), num_nodes as usize);
        Self {
            num_nodes,
            seed,
            cells: supernodes.into_iter().map(Mutex::new).collect(),
        }
    }

    pub(crate) fn cell(&self, v: NodeId) -> &Mutex<Supernode> {
        &self.cells[v as usize]
    }
}

impl BatchHandler for SupernodeTable {
    fn make_scratch(&self) -> Supernode {
        Supernode::new(self.num_nodes, self.seed)
    }

    fn apply_batch(&self, src: NodeId, dsts: &[NodeId], scratch: &mut Supernode) {
        Supernode::delta(src, dsts, scratch);
        self.cells[src as usize].lock().merge(scratch);
    }
}

/// Undirected multigraph with vertices `0..n`, no self-loops or weights,
/// maintained under a stream of edge insertions and deletions.
pub struct Graph {
    table: Arc<SupernodeTable>,
    dsu: DisjointSets,
    /// Confirmed tree-edge endpoints per root; guarded per source vertex.
    forest: Vec<Mutex<HashSet<NodeId>>>,
    dsu_valid: AtomicBool,
    update_locked: AtomicBool,
    num_updates: AtomicU64,
    gutter: GutteringSystem,
    config: GraphConfiguration,
    fail_round_2: AtomicBool,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("num_nodes", &self.table.num_nodes)
            .field("num_updates", &self.num_updates.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Graph {
    /// Build an empty engine over `num_nodes` vertices.
    ///
    /// Fails with [`GraphError::MultipleGraphs`] if another engine is
    /// already open in this process.
    pub fn new(num_nodes: NodeId, config: GraphConfiguration) -> Result<Self> {
        Self::assemble(num_nodes, None, config, true)
    }

    /// Common constructor for [`new`](Self::new) and the snapshot reheat
    /// path; claims the process-wide guard.
    fn assemble(
        num_nodes: NodeId,
        supernodes: Option<(u64, Vec<Supernode>)>,
        config: GraphConfiguration,
        dsu_valid: bool,
    ) -> Result<Self> {
        if OPEN_GRAPH
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(GraphError::MultipleGraphs);
        }

        let table = Arc::new(match supernodes {
            Some((seed, supernodes)) => SupernodeTable::from_supernodes(num_nodes, seed, supernodes),
            None => {
                let seed = config.get_seed().unwrap_or_else(rand::random);
                SupernodeTable::new(num_nodes, seed)
            }
        });
        let handler: Arc<dyn BatchHandler> = Arc::clone(&table) as Arc<dyn BatchHandler>;
        let gutter = GutteringSystem::new(
            num_nodes,
            config.get_gutter_sys(),
            config.get_gutter_conf(),
            config.worker_threads(),
            handler,
        );
        info!(num_nodes, "graph engine open\n{config}");

        Ok(Self {
            table,
            dsu: DisjointSets::new(num_nodes),
            forest: (0..num_nodes).map(|_| Mutex::new(HashSet::new())).collect(),
            dsu_valid: AtomicBool::new(dsu_valid),
            update_locked: AtomicBool::new(false),
            num_updates: AtomicU64::new(0),
            gutter,
            config,
            fail_round_2: AtomicBool::new(false),
        })
    }

    /// Number of vertices.
    pub fn nodes(&self) -> NodeId {
        self.table.num_nodes
    }

    /// Updates applied so far.
    pub fn update_count(&self) -> u64 {
        self.num_updates.load(Ordering::Relaxed)
    }

    /// Apply one stream update. `thread_id` identifies the calling ingest
    /// thread for the gutter.
    ///
    /// Fails with [`GraphError::UpdateLocked`] after a terminal
    /// connected-components run has started.
    pub fn update(&self, upd: GraphUpdate, thread_id: usize) -> Result<()> {
        if self.update_locked.load(Ordering::Acquire) {
            return Err(GraphError::UpdateLocked);
        }
        if upd.kind == UpdateKind::Breakpoint {
            warn!("breakpoint update passed to Graph::update, ignoring");
            return Ok(());
        }

        let (u, v) = (upd.edge.src, upd.edge.dst);
        self.gutter.insert((u, v), thread_id);
        self.gutter.insert((v, u), thread_id);
        self.num_updates.fetch_add(1, Ordering::Relaxed);

        if !self.config.get_eager_dsu() {
            if self.dsu_valid.load(Ordering::Acquire) {
                self.dsu_valid.store(false, Ordering::Release);
            }
            return Ok(());
        }
        match upd.kind {
            UpdateKind::Insert => {
                if self.dsu_valid.load(Ordering::Acquire) {
                    self.eager_insert(u, v);
                }
            }
            // Deleting a tree edge would disconnect what the forest says
            // is connected; a non-tree deletion would be safe, but the
            // engine does not track multiplicities to tell them apart.
            UpdateKind::Delete => self.dsu_valid.store(false, Ordering::Release),
            UpdateKind::Breakpoint => unreachable!(),
        }
        Ok(())
    }

    /// Eager-DSU step for the insertion of `{u, v}`.
    fn eager_insert(&self, u: NodeId, v: NodeId) {
        let src = u.min(v);
        let dst = u.max(v);
        let mut forest = self.forest[src as usize].lock();
        if forest.contains(&dst) {
            // A second copy of a recorded tree edge: deleting either copy
            // later could not be resolved against the forest.
            self.dsu_valid.store(false, Ordering::Release);
        } else if self.dsu.link(u, v) {
            forest.insert(dst);
        }
    }

    /// Are `a` and `b` in the same connected component?
    ///
    /// Flushes pending updates first. When the DSU is invalid this runs a
    /// full sketch query (with continuation), so it may fail with
    /// [`GraphError::CCFailure`].
    pub fn point_query(&self, a: NodeId, b: NodeId) -> Result<bool> {
        self.gutter.force_flush();
        if !self.dsu_valid.load(Ordering::Acquire) {
            self.connected_components(true)?;
        }
        Ok(self.dsu.find(a) == self.dsu.find(b))
    }

    /// Compute the connected components of the current graph.
    ///
    /// With `cont = true` the sketches are cloned before the query mutates
    /// them and restored afterwards, so updates may resume; the engine
    /// also rolls back to that copy if the query fails. With
    /// `cont = false` the engine is terminal once the query begins:
    /// further updates fail with [`GraphError::UpdateLocked`].
    pub fn connected_components(&self, cont: bool) -> Result<Vec<HashSet<NodeId>>> {
        self.update_locked.store(true, Ordering::Release);
        let flush_start = Instant::now();
        self.gutter.force_flush();
        debug!(elapsed_us = flush_start.elapsed().as_micros() as u64, "pre-query flush");

        let cc_start = Instant::now();
        let result = if self.dsu_valid.load(Ordering::Acquire) {
            Ok(self.cc_from_dsu())
        } else {
            let backup = if cont {
                Some(self.backup_supernodes()?)
            } else {
                None
            };
            match self.boruvka_emulation() {
                Ok(components) => {
                    if let Some(backup) = backup {
                        self.restore_supernodes(backup)?;
                    }
                    Ok(components)
                }
                Err(e) => {
                    if let Some(backup) = backup {
                        self.restore_supernodes(backup)?;
                    }
                    self.dsu_valid.store(false, Ordering::Release);
                    Err(e)
                }
            }
        };
        debug!(
            elapsed_us = cc_start.elapsed().as_micros() as u64,
            ok = result.is_ok(),
            "connected components finished"
        );

        if cont {
            self.update_locked.store(false, Ordering::Release);
        }
        result
    }

    /// Components straight from a valid DSU: the equivalence classes of
    /// `find`.
    fn cc_from_dsu(&self) -> Vec<HashSet<NodeId>> {
        let mut classes: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
        for v in 0..self.nodes() {
            classes.entry(self.dsu.find(v)).or_default().insert(v);
        }
        classes.into_values().collect()
    }

    /// Arrange for the next sketch query to fail at the start of its
    /// second round. One-shot; exercises the restore path in tests.
    #[doc(hidden)]
    pub fn should_fail_cc(&self) {
        self.fail_round_2.store(true, Ordering::Release);
    }

    /// Clones of all supernodes, for restore assertions in tests.
    #[doc(hidden)]
    pub fn supernode_snapshot(&self) -> Vec<Supernode> {
        self.table.cells.iter().map(|c| c.lock().clone()).collect()
    }

    /// Whether point queries currently short-circuit through the DSU.
    #[doc(hidden)]
    pub fn dsu_is_valid(&self) -> bool {
        self.dsu_valid.load(Ordering::Acquire)
    }

    /// DSU representative of `v`.
    #[doc(hidden)]
    pub fn find_root(&self, v: NodeId) -> NodeId {
        self.dsu.find(v)
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        OPEN_GRAPH.store(false, Ordering::Release);
    }
}
