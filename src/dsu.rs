//! Disjoint-set union over vertex ids with atomic parent slots.
//!
//! `find` uses path halving; the halving write is a compare-exchange so
//! concurrent finds never corrupt the forest. `link` performs union by
//! size with a compare-exchange parent swing, retrying the find on
//! contention. Sizes are advisory (they only steer the union direction),
//! so relaxed additions are sufficient.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::types::NodeId;

pub struct DisjointSets {
    parent: Vec<AtomicU32>,
    size: Vec<AtomicU32>,
}

impl DisjointSets {
    /// `n` singleton sets.
    pub fn new(n: NodeId) -> Self {
        Self {
            parent: (0..n).map(AtomicU32::new).collect(),
            size: (0..n).map(|_| AtomicU32::new(1)).collect(),
        }
    }

    /// Restore every vertex to a singleton.
    pub fn reset(&self) {
        for (i, p) in self.parent.iter().enumerate() {
            p.store(i as NodeId, Ordering::Relaxed);
        }
        for s in &self.size {
            s.store(1, Ordering::Relaxed);
        }
    }

    /// Representative of `x`'s set, halving the path on the way up.
    pub fn find(&self, mut x: NodeId) -> NodeId {
        loop {
            let p = self.parent[x as usize].load(Ordering::Acquire);
            if p == x {
                return x;
            }
            let gp = self.parent[p as usize].load(Ordering::Acquire);
            if gp != p {
                // Halve: point x at its grandparent. A lost race just
                // means someone else already shortened the path.
                let _ = self.parent[x as usize].compare_exchange_weak(
                    p,
                    gp,
                    Ordering::Release,
                    Ordering::Relaxed,
                );
            }
            x = gp;
        }
    }

    /// Union the sets of `u` and `v` by size. Returns `true` if two
    /// distinct sets were merged, `false` if they were already one.
    pub fn link(&self, u: NodeId, v: NodeId) -> bool {
        loop {
            let mut a = self.find(u);
            let mut b = self.find(v);
            if a == b {
                return false;
            }
            if self.size[a as usize].load(Ordering::Relaxed)
                < self.size[b as usize].load(Ordering::Relaxed)
            {
                std::mem::swap(&mut a, &mut b);
            }
            if self.parent[b as usize]
                .compare_exchange(b, a, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                let gained = self.size[b as usize].load(Ordering::Relaxed);
                self.size[a as usize].fetch_add(gained, Ordering::Relaxed);
                return true;
            }
            // b stopped being a root underneath us; retry the finds.
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singletons_are_their_own_roots() {
        let dsu = DisjointSets::new(4);
        for i in 0..4 {
            assert_eq!(dsu.find(i), i);
        }
    }

    #[test]
    fn link_merges_and_reports() {
        let dsu = DisjointSets::new(4);
        assert!(dsu.link(0, 1));
        assert!(dsu.link(2, 3));
        assert!(dsu.link(1, 3));
        assert!(!dsu.link(0, 2));
        let root = dsu.find(0);
        for i in 1..4 {
            assert_eq!(dsu.find(i), root);
        }
    }

    #[test]
    fn reset_restores_singletons() {
        let dsu = DisjointSets::new(3);
        dsu.link(0, 2);
        dsu.reset();
        assert_ne!(dsu.find(0), dsu.find(2));
    }

    #[test]
    fn concurrent_links_converge() {
        use std::sync::Arc;
        let dsu = Arc::new(DisjointSets::new(128));
        std::thread::scope(|scope| {
            for t in 0..4 {
                let dsu = Arc::clone(&dsu);
                scope.spawn(move || {
                    for i in (t..127).step_by(4) {
                        dsu.link(i as NodeId, i as NodeId + 1);
                    }
                });
            }
        });
        let root = dsu.find(0);
        for i in 1..128 {
            assert_eq!(dsu.find(i), root);
        }
    }
}
