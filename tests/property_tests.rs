//! Property tests: sketch queries agree with exact graph connectivity,
//! cancellation empties the graph, and the multi-reader stream delivers
//! every record exactly once.

use freshet::stream::BinaryGraphStreamMt;
use freshet::{Graph, GraphConfiguration, GraphUpdate, NodeId};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::io::Write;

static GRAPH_LOCK: Mutex<()> = Mutex::new(());

/// Exact components by plain union-find.
fn reference_components(num_nodes: NodeId, edges: &BTreeSet<(NodeId, NodeId)>) -> Vec<Vec<NodeId>> {
    let mut parent: Vec<usize> = (0..num_nodes as usize).collect();
    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }
    for &(u, v) in edges {
        let (ru, rv) = (find(&mut parent, u as usize), find(&mut parent, v as usize));
        if ru != rv {
            parent[ru] = rv;
        }
    }
    let mut classes: std::collections::HashMap<usize, Vec<NodeId>> = Default::default();
    for v in 0..num_nodes as usize {
        classes.entry(find(&mut parent, v)).or_default().push(v as NodeId);
    }
    let mut out: Vec<Vec<NodeId>> = classes.into_values().collect();
    for class in &mut out {
        class.sort_unstable();
    }
    out.sort();
    out
}

fn normalise(components: Vec<HashSet<NodeId>>) -> Vec<Vec<NodeId>> {
    let mut out: Vec<Vec<NodeId>> = components
        .into_iter()
        .map(|c| {
            let mut v: Vec<NodeId> = c.into_iter().collect();
            v.sort_unstable();
            v
        })
        .collect();
    out.sort();
    out
}

/// Distinct undirected edges over up to `n` vertices.
fn arb_edges(n: NodeId) -> impl Strategy<Value = BTreeSet<(NodeId, NodeId)>> {
    prop::collection::btree_set(
        (0..n, 0..n)
            .prop_filter("no self loops", |(u, v)| u != v)
            .prop_map(|(u, v)| (u.min(v), u.max(v))),
        0..40,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn sketch_components_match_exact_components(edges in arb_edges(20)) {
        let _guard = GRAPH_LOCK.lock();
        // Eager DSU off so the query always runs through the sketches.
        let config = GraphConfiguration::new().seed(0xfeed).eager_dsu(false);
        let graph = Graph::new(20, config).unwrap();
        for &(u, v) in &edges {
            graph.update(GraphUpdate::insert(u, v), 0).unwrap();
        }
        let components = normalise(graph.connected_components(false).unwrap());
        prop_assert_eq!(components, reference_components(20, &edges));
    }

    #[test]
    fn inserting_then_deleting_everything_leaves_singletons(edges in arb_edges(16)) {
        let _guard = GRAPH_LOCK.lock();
        let config = GraphConfiguration::new().seed(0xbead).eager_dsu(false);
        let graph = Graph::new(16, config).unwrap();
        for &(u, v) in &edges {
            graph.update(GraphUpdate::insert(u, v), 0).unwrap();
        }
        for &(u, v) in &edges {
            graph.update(GraphUpdate::delete(u, v), 0).unwrap();
        }
        let components = normalise(graph.connected_components(false).unwrap());
        let singletons: Vec<Vec<NodeId>> = (0..16).map(|v| vec![v]).collect();
        prop_assert_eq!(components, singletons);
    }

    #[test]
    fn eager_and_sketch_queries_agree(edges in arb_edges(16)) {
        let _guard = GRAPH_LOCK.lock();
        let eager = {
            let config = GraphConfiguration::new().seed(0xace).eager_dsu(true);
            let graph = Graph::new(16, config).unwrap();
            for &(u, v) in &edges {
                graph.update(GraphUpdate::insert(u, v), 0).unwrap();
            }
            normalise(graph.connected_components(false).unwrap())
        };
        let config = GraphConfiguration::new().seed(0xace).eager_dsu(false);
        let graph = Graph::new(16, config).unwrap();
        for &(u, v) in &edges {
            graph.update(GraphUpdate::insert(u, v), 0).unwrap();
        }
        let sketch = normalise(graph.connected_components(false).unwrap());
        prop_assert_eq!(eager, sketch);
    }

    #[test]
    fn readers_deliver_the_stream_exactly_once(
        record_count in 1usize..400,
        readers in 1usize..5,
        buf_bytes in 9usize..256,
    ) {
        let mut updates = Vec::with_capacity(record_count);
        for i in 0..record_count as u32 {
            let u = i % 37;
            let v = (i * 7 + 1) % 37;
            let upd = if u == v {
                GraphUpdate::insert(u, v + 1)
            } else if i % 3 == 0 {
                GraphUpdate::delete(u, v)
            } else {
                GraphUpdate::insert(u, v)
            };
            updates.push(upd);
        }

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&38u32.to_le_bytes()).unwrap();
        file.write_all(&(updates.len() as u64).to_le_bytes()).unwrap();
        for upd in &updates {
            file.write_all(&upd.encode()).unwrap();
        }
        file.flush().unwrap();

        let stream = BinaryGraphStreamMt::new(file.path(), buf_bytes).unwrap();
        let collected: Vec<GraphUpdate> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..readers)
                .map(|_| {
                    scope.spawn(|| {
                        let mut reader = stream.reader();
                        let mut local = Vec::new();
                        loop {
                            let upd = reader.get_edge().unwrap();
                            if upd.is_breakpoint() {
                                return local;
                            }
                            local.push(upd);
                        }
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        let mut got: Vec<[u8; 9]> = collected.iter().map(|u| u.encode()).collect();
        let mut want: Vec<[u8; 9]> = updates.iter().map(|u| u.encode()).collect();
        got.sort_unstable();
        want.sort_unstable();
        prop_assert_eq!(got, want);
    }
}
