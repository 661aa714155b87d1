//! Per-vertex supernode: a stack of independent L0 sketches over the
//! vertex's incident edges.

use std::io::{Read, Write};

use crate::sketch::{mix64, SampleResult, Sketch};
use crate::types::{edge_key, NodeId};

/// How many independent sketches a supernode carries: enough for one per
/// Borůvka round (components at least halve each round) plus slack.
pub(crate) fn sketches_for(num_nodes: NodeId) -> usize {
    let log_n = 64 - (num_nodes.max(1) as u64 - 1).leading_zeros() as usize;
    ((log_n as f64 * 1.72).ceil() as usize + 1).max(2)
}

/// Sketch state for one vertex.
///
/// Invariant: at any time the supernode equals the XOR-sum of `edge_key`s
/// of all updates seen so far that have this vertex as an endpoint. Both
/// orientations of an update are applied (once per endpoint), so merging
/// the supernodes of `u` and `v` cancels the `{u, v}` contribution and
/// yields a sketch of the edges crossing the merged component's boundary.
///
/// Every supernode of a graph shares one seed schedule — identical hash
/// functions across vertices are what make the merge invariant hold.
///
/// `sample` consumes one sketch per call; each sketch's randomness is
/// independent, so a fresh sketch per Borůvka round keeps samples
/// independent of the merges the previous round performed. When the stack
/// runs out the supernode reports [`SampleResult::Fail`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Supernode {
    num_nodes: NodeId,
    seed: u64,
    idx: usize,
    sketches: Vec<Sketch>,
}

impl Supernode {
    /// Build an empty supernode for an `n`-vertex graph.
    pub fn new(num_nodes: NodeId, seed: u64) -> Self {
        let count = sketches_for(num_nodes);
        let sketches = (0..count)
            .map(|i| Sketch::new(num_nodes, mix64(seed.wrapping_add(i as u64))))
            .collect();
        Self {
            num_nodes,
            seed,
            idx: 0,
            sketches,
        }
    }

    /// Toggle the edge `{src, dst}` in every sketch.
    pub fn update(&mut self, src: NodeId, dst: NodeId) {
        let key = edge_key(src, dst);
        for sketch in &mut self.sketches {
            sketch.update(key);
        }
    }

    /// Apply updates for the edges `{src, d}` for each `d` in `dsts`.
    pub fn batch_update(&mut self, src: NodeId, dsts: &[NodeId]) {
        for &dst in dsts {
            self.update(src, dst);
        }
    }

    /// Fill `scratch` with the delta supernode for a batch, reusing its
    /// allocations. Merging the delta into a live supernode applies the
    /// whole batch at once.
    pub fn delta(src: NodeId, dsts: &[NodeId], scratch: &mut Supernode) {
        scratch.clear();
        scratch.batch_update(src, dsts);
    }

    /// XOR-merge `other` into `self`. Sketches already consumed by either
    /// side stay dead: the cursor advances to the later of the two.
    pub fn merge(&mut self, other: &Supernode) {
        debug_assert_eq!(self.num_nodes, other.num_nodes);
        debug_assert_eq!(self.seed, other.seed);
        self.idx = self.idx.max(other.idx);
        for i in self.idx..self.sketches.len() {
            self.sketches[i].merge(&other.sketches[i]);
        }
    }

    /// Sample one incident edge, consuming the next unused sketch.
    /// Returns [`SampleResult::Fail`] once the stack is exhausted.
    pub fn sample(&mut self) -> SampleResult {
        if self.idx >= self.sketches.len() {
            return SampleResult::Fail;
        }
        let result = self.sketches[self.idx].sample();
        self.idx += 1;
        result
    }

    /// Standalone duplicate, usable in a separate query run.
    pub fn make_copy(&self) -> Supernode {
        self.clone()
    }

    /// Reset to the empty state without reallocating.
    pub fn clear(&mut self) {
        self.idx = 0;
        for sketch in &mut self.sketches {
            sketch.clear();
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub(crate) fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(&(self.idx as u32).to_le_bytes())?;
        for sketch in &self.sketches {
            sketch.write_to(w)?;
        }
        Ok(())
    }

    pub(crate) fn read_from<R: Read>(
        r: &mut R,
        num_nodes: NodeId,
        seed: u64,
    ) -> std::io::Result<Self> {
        let mut buf = [0u8; 4];
        r.read_exact(&mut buf)?;
        let idx = u32::from_le_bytes(buf) as usize;
        let count = sketches_for(num_nodes);
        let mut sketches = Vec::with_capacity(count);
        for i in 0..count {
            sketches.push(Sketch::read_from(
                r,
                num_nodes,
                mix64(seed.wrapping_add(i as u64)),
            )?);
        }
        Ok(Self {
            num_nodes,
            seed,
            idx,
            sketches,
        })
    }
}
