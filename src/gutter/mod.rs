//! Guttering: write batching between ingest threads and the sketches.
//!
//! Applying one update to a supernode touches every sketch in it, so the
//! engine never applies updates one at a time. Updates are buffered per
//! source vertex ("gutters"); a full gutter becomes a `(src, dsts)` batch
//! on a work queue drained by a pool of worker threads. Each worker turns
//! a batch into a delta supernode in its private scratch slot, then merges
//! the delta into the live supernode under that vertex's lock.
//!
//! Three buffering backends share this contract:
//!
//! - [`GutterSystem::StandAlone`] — one leaf gutter per source vertex.
//! - [`GutterSystem::Tree`] — updates land in root buckets covering
//!   `fanout` sources each and are partitioned into the leaf gutters when
//!   a bucket fills; fewer hot locks when sources are sparse.
//! - [`GutterSystem::CacheTree`] — the tree with root buckets scaled up
//!   by `cache_factor`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use tracing::debug;

use crate::config::{GutterConfiguration, GutterSystem};
use crate::sketch::Supernode;
use crate::types::NodeId;

/// Destination list of one batch; small batches (sparse sources at flush
/// time) stay inline.
pub type DstList = SmallVec<[NodeId; 8]>;

/// A drained gutter: all buffered destinations for one source vertex.
struct Batch {
    src: NodeId,
    dsts: DstList,
}

/// Consumer side of the work queue. Implemented by the engine's supernode
/// table.
pub trait BatchHandler: Send + Sync + 'static {
    /// Preallocate one scratch supernode; called once per worker thread.
    fn make_scratch(&self) -> Supernode;

    /// Apply a batch of updates originating at `src`, using `scratch` as
    /// the delta slot.
    fn apply_batch(&self, src: NodeId, dsts: &[NodeId], scratch: &mut Supernode);
}

struct WorkQueue {
    queue: Mutex<VecDeque<Batch>>,
    available: Condvar,
    /// Batches enqueued or currently executing.
    inflight: Mutex<usize>,
    drained: Condvar,
    shutdown: AtomicBool,
}

impl WorkQueue {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            inflight: Mutex::new(0),
            drained: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    fn push(&self, batch: Batch) {
        *self.inflight.lock() += 1;
        self.queue.lock().push_back(batch);
        self.available.notify_one();
    }

    /// Blocks until work arrives; `None` once shut down and empty.
    fn pop(&self) -> Option<Batch> {
        let mut queue = self.queue.lock();
        loop {
            if let Some(batch) = queue.pop_front() {
                return Some(batch);
            }
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }
            self.available.wait(&mut queue);
        }
    }

    fn mark_done(&self) {
        let mut inflight = self.inflight.lock();
        *inflight -= 1;
        if *inflight == 0 {
            self.drained.notify_all();
        }
    }

    fn wait_drained(&self) {
        let mut inflight = self.inflight.lock();
        while *inflight > 0 {
            self.drained.wait(&mut inflight);
        }
    }

    fn shut_down(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.available.notify_all();
    }
}

struct GutterInner {
    /// Per-source destination buffers.
    leaves: Vec<Mutex<Vec<NodeId>>>,
    leaf_cap: usize,
    /// Root buckets of `(src, dst)` pairs; empty vec for StandAlone.
    buckets: Vec<Mutex<Vec<(NodeId, NodeId)>>>,
    bucket_cap: usize,
    fanout: usize,
    work: WorkQueue,
}

impl GutterInner {
    fn enqueue_leaf(&self, src: NodeId, leaf: &mut Vec<NodeId>) {
        if leaf.is_empty() {
            return;
        }
        let dsts = DstList::from_slice(leaf);
        leaf.clear();
        self.work.push(Batch { src, dsts });
    }

    fn insert_leaf(&self, src: NodeId, dst: NodeId) {
        let mut leaf = self.leaves[src as usize].lock();
        leaf.push(dst);
        if leaf.len() >= self.leaf_cap {
            self.enqueue_leaf(src, &mut leaf);
        }
    }

    /// Partition a root bucket's pairs into their leaf gutters.
    fn spill_bucket(&self, bucket: &mut Vec<(NodeId, NodeId)>) {
        for (src, dst) in bucket.drain(..) {
            self.insert_leaf(src, dst);
        }
    }
}

/// Batching buffer plus its worker pool.
///
/// Workers are spawned at construction and joined on drop.
pub struct GutteringSystem {
    inner: Arc<GutterInner>,
    workers: Vec<JoinHandle<()>>,
}

impl GutteringSystem {
    /// Build a gutter for `num_nodes` sources feeding `handler` through
    /// `workers` threads.
    pub fn new(
        num_nodes: NodeId,
        backend: GutterSystem,
        conf: &GutterConfiguration,
        workers: usize,
        handler: Arc<dyn BatchHandler>,
    ) -> Self {
        let leaf_cap = (conf.gutter_bytes / std::mem::size_of::<NodeId>()).max(1);
        let fanout = conf.fanout.max(1);
        let (buckets, bucket_cap) = match backend {
            GutterSystem::StandAlone => (0, 0),
            GutterSystem::Tree => tree_dims(num_nodes, fanout, leaf_cap, 1),
            GutterSystem::CacheTree => tree_dims(num_nodes, fanout, leaf_cap, conf.cache_factor.max(1)),
        };

        let inner = Arc::new(GutterInner {
            leaves: (0..num_nodes).map(|_| Mutex::new(Vec::new())).collect(),
            leaf_cap,
            buckets: (0..buckets).map(|_| Mutex::new(Vec::new())).collect(),
            bucket_cap,
            fanout,
            work: WorkQueue::new(),
        });

        let workers = (0..workers.max(1))
            .map(|id| {
                let inner = Arc::clone(&inner);
                let handler = Arc::clone(&handler);
                std::thread::Builder::new()
                    .name(format!("gutter-worker-{id}"))
                    .spawn(move || {
                        let mut scratch = handler.make_scratch();
                        while let Some(batch) = inner.work.pop() {
                            handler.apply_batch(batch.src, &batch.dsts, &mut scratch);
                            inner.work.mark_done();
                        }
                    })
                    .expect("failed to spawn gutter worker")
            })
            .collect();

        Self { inner, workers }
    }

    /// Buffer the update `(src, dst)`. `_thread_id` identifies the
    /// inserter; the in-memory backends do not shard by it.
    pub fn insert(&self, edge: (NodeId, NodeId), _thread_id: usize) {
        let (src, dst) = edge;
        if self.inner.buckets.is_empty() {
            self.inner.insert_leaf(src, dst);
            return;
        }
        let idx = src as usize / self.inner.fanout;
        let mut bucket = self.inner.buckets[idx].lock();
        bucket.push((src, dst));
        if bucket.len() >= self.inner.bucket_cap {
            let mut spill = std::mem::take(&mut *bucket);
            drop(bucket);
            self.inner.spill_bucket(&mut spill);
        }
    }

    /// Drain every bucket and leaf into the work queue and block until the
    /// workers have applied everything. Idempotent: a second call with no
    /// intervening inserts finds nothing to drain.
    pub fn force_flush(&self) {
        for bucket in &self.inner.buckets {
            let mut spill = std::mem::take(&mut *bucket.lock());
            self.inner.spill_bucket(&mut spill);
        }
        for (src, leaf) in self.inner.leaves.iter().enumerate() {
            self.inner.enqueue_leaf(src as NodeId, &mut leaf.lock());
        }
        self.inner.work.wait_drained();
        debug!("gutter flush complete");
    }
}

impl Drop for GutteringSystem {
    fn drop(&mut self) {
        self.inner.work.shut_down();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Root bucket count and capacity for the tree backends.
fn tree_dims(num_nodes: NodeId, fanout: usize, leaf_cap: usize, scale: usize) -> (usize, usize) {
    let count = (num_nodes as usize).div_ceil(fanout).max(1);
    let cap = ((leaf_cap * fanout) / 2).max(1) * scale;
    (count, cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    /// Records delivered batches instead of touching sketches.
    struct Recorder {
        seen: PlMutex<Vec<(NodeId, Vec<NodeId>)>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: PlMutex::new(Vec::new()),
            })
        }
    }

    impl BatchHandler for Recorder {
        fn make_scratch(&self) -> Supernode {
            Supernode::new(16, 0)
        }

        fn apply_batch(&self, src: NodeId, dsts: &[NodeId], _scratch: &mut Supernode) {
            self.seen.lock().push((src, dsts.to_vec()));
        }
    }

    fn delivered(recorder: &Recorder) -> Vec<(NodeId, NodeId)> {
        let mut pairs: Vec<(NodeId, NodeId)> = recorder
            .seen
            .lock()
            .iter()
            .flat_map(|(src, dsts)| dsts.iter().map(|&d| (*src, d)).collect::<Vec<_>>())
            .collect();
        pairs.sort_unstable();
        pairs
    }

    fn exercise(backend: GutterSystem) {
        let recorder = Recorder::new();
        let gutter = GutteringSystem::new(
            16,
            backend,
            &GutterConfiguration {
                gutter_bytes: 16, // 4 ids per leaf, forces mid-stream batches
                fanout: 4,
                cache_factor: 2,
            },
            2,
            recorder.clone(),
        );

        let mut expect = Vec::new();
        for i in 0..16u32 {
            for j in 0..6u32 {
                let dst = (i + j + 1) % 16;
                gutter.insert((i, dst), 0);
                expect.push((i, dst));
            }
        }
        gutter.force_flush();
        expect.sort_unstable();
        assert_eq!(delivered(&recorder), expect);
    }

    #[test]
    fn standalone_delivers_everything() {
        exercise(GutterSystem::StandAlone);
    }

    #[test]
    fn tree_delivers_everything() {
        exercise(GutterSystem::Tree);
    }

    #[test]
    fn cache_tree_delivers_everything() {
        exercise(GutterSystem::CacheTree);
    }

    #[test]
    fn flush_is_idempotent() {
        let recorder = Recorder::new();
        let gutter = GutteringSystem::new(
            8,
            GutterSystem::StandAlone,
            &GutterConfiguration::default(),
            1,
            recorder.clone(),
        );
        gutter.insert((1, 2), 0);
        gutter.force_flush();
        let after_first = recorder.seen.lock().len();
        gutter.force_flush();
        assert_eq!(recorder.seen.lock().len(), after_first);
    }
}
