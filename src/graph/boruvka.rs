//! Sketch-sampled Borůvka over the supernodes.
//!
//! Each round, every surviving component representative samples one edge
//! leaving its component from its supernode. Sampled edges are resolved
//! through the DSU; representatives that fell into the same class are
//! contracted by merging their supernodes into the smallest-id member,
//! whose sketch then covers exactly the edges crossing the enlarged
//! component's boundary. The loop ends on the first round with no merges;
//! components at least halve per round, so there are at most `log2 n`
//! productive rounds.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;

use rayon::prelude::*;
use tracing::debug;

use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::sketch::SampleResult;
use crate::types::NodeId;

impl Graph {
    /// Run the full sketch query. Rebuilds the engine DSU (and clears the
    /// spanning forest) as a side effect; on success the DSU is valid for
    /// the queried graph.
    pub(crate) fn boruvka_emulation(&self) -> Result<Vec<HashSet<NodeId>>> {
        self.dsu.reset();
        for forest in &self.forest {
            forest.lock().clear();
        }

        let mut reps: Vec<NodeId> = (0..self.nodes()).collect();
        let mut round = 0u32;
        loop {
            round += 1;
            if round == 2 && self.fail_round_2.swap(false, Ordering::AcqRel) {
                return Err(GraphError::CCFailure);
            }

            // Sample phase: one edge per representative, in parallel.
            let samples: Vec<(NodeId, SampleResult)> = reps
                .par_iter()
                .map(|&rep| (rep, self.table.cell(rep).lock().sample()))
                .collect();
            if samples
                .iter()
                .any(|(_, sample)| matches!(sample, SampleResult::Fail))
            {
                return Err(GraphError::CCFailure);
            }

            // Union phase: a sampled edge may name non-representatives;
            // `link`'s internal finds promote them to their class.
            let mut merged_any = false;
            for (_, sample) in &samples {
                if let SampleResult::Edge(edge) = sample {
                    if self.dsu.link(edge.src, edge.dst) {
                        merged_any = true;
                    }
                }
            }
            if !merged_any {
                break;
            }

            // Merge phase: contract each class onto its smallest member.
            let mut classes: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
            for &rep in &reps {
                classes.entry(self.dsu.find(rep)).or_default().push(rep);
            }
            let mut new_reps = Vec::with_capacity(classes.len());
            for members in classes.values() {
                let lead = *members.iter().min().unwrap();
                if members.len() > 1 {
                    let mut lead_sn = self.table.cell(lead).lock();
                    for &member in members {
                        if member != lead {
                            lead_sn.merge(&self.table.cell(member).lock());
                        }
                    }
                }
                new_reps.push(lead);
            }
            new_reps.sort_unstable();
            debug!(round, reps = new_reps.len(), "boruvka round contracted");
            reps = new_reps;
        }

        self.dsu_valid.store(true, Ordering::Release);

        let mut components: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
        for v in 0..self.nodes() {
            components.entry(self.dsu.find(v)).or_default().insert(v);
        }
        Ok(components.into_values().collect())
    }
}
