//! End-to-end algorithm scenarios over on-disk fixtures.

use std::path::Path;

use bgapps::{coloring, count, mst, pagerank, random_walk, sssp, wcc};
use bgraph::layout::GraphBuilder;
use bgraph::{BlockEngine, EngineConfig};

fn config(root: &Path) -> EngineConfig {
    let mut cfg = EngineConfig::new(root);
    cfg.parallelism = 2;
    cfg.memory_budget = 1 << 20;
    cfg.edge_buffer_budget = 1 << 20;
    cfg
}

#[test]
fn wcc_on_a_path_collapses_to_zero() {
    let dir = tempfile::tempdir().unwrap();
    // undirected path 0-1-2-3: one block, two sub-blocks
    let mut b = GraphBuilder::new(4).offset_ratio(2);
    b.undirected_edge(0, 1).undirected_edge(1, 2).undirected_edge(2, 3);
    b.block(0, 4, &[(0, 2), (2, 4)]);
    b.write(dir.path()).unwrap();

    let engine = BlockEngine::<u32>::open(config(dir.path())).unwrap();
    wcc::run(&engine);
    assert_eq!(engine.state().snapshot_read(), vec![0, 0, 0, 0]);
    assert_eq!(engine.remaining_edges(), 0);
    assert_eq!(wcc::num_components(&engine.state(), 4), 1);
    engine.stop().unwrap();
}

#[test]
fn wcc_keeps_separate_components_apart() {
    let dir = tempfile::tempdir().unwrap();
    // components {0,1,2} and {3,4}, two blocks
    let mut b = GraphBuilder::new(5).offset_ratio(2);
    b.undirected_edge(0, 1).undirected_edge(1, 2).undirected_edge(3, 4);
    b.block(0, 3, &[(0, 3)]);
    b.block(3, 5, &[(3, 5)]);
    b.write(dir.path()).unwrap();

    let engine = BlockEngine::<u32>::open(config(dir.path())).unwrap();
    wcc::run(&engine);
    assert_eq!(engine.state().snapshot_read(), vec![0, 0, 0, 3, 3]);
    assert_eq!(wcc::num_components(&engine.state(), 5), 2);
    engine.stop().unwrap();
}

#[test]
fn pagerank_on_a_ring_holds_the_fixed_point() {
    let dir = tempfile::tempdir().unwrap();
    // 5-vertex directed ring, every out-degree 1; the damped pull
    // iteration has fixed point 1.0 here
    let mut b = GraphBuilder::new(5).offset_ratio(2);
    for v in 0..5u32 {
        b.edge(v, (v + 1) % 5);
    }
    b.single_block(2);
    b.write(dir.path()).unwrap();

    let engine = BlockEngine::<f32>::open(config(dir.path())).unwrap();
    pagerank::run(&engine, 3);
    let s = engine.state();
    for v in 0..5 {
        assert!((s.read(v) - 1.0).abs() < 1e-4, "vertex {v}: {}", s.read(v));
    }
    engine.stop().unwrap();
}

#[test]
fn pagerank_mass_is_preserved_on_a_star() {
    let dir = tempfile::tempdir().unwrap();
    // 1 -> 0, 2 -> 0, 0 -> 1, 0 -> 2: symmetric star
    let mut b = GraphBuilder::new(3).offset_ratio(2);
    b.undirected_edge(0, 1).undirected_edge(0, 2);
    b.single_block(1);
    b.write(dir.path()).unwrap();

    let engine = BlockEngine::<f32>::open(config(dir.path())).unwrap();
    pagerank::run(&engine, 20);
    let s = engine.state();
    let total: f32 = (0..3).map(|v| s.read(v)).sum();
    assert!((total - 3.0).abs() < 1e-2, "rank mass {total}");
    // the hub outranks the leaves
    assert!(s.read(0) > s.read(1));
    assert!((s.read(1) - s.read(2)).abs() < 1e-5);
    engine.stop().unwrap();
}

#[test]
fn sssp_hop_counts_on_a_dag() {
    let dir = tempfile::tempdir().unwrap();
    // 0->1, 0->2, 1->3, 2->3, 3->4
    let mut b = GraphBuilder::new(5).offset_ratio(2);
    b.edge(0, 1).edge(0, 2).edge(1, 3).edge(2, 3).edge(3, 4);
    b.block(0, 5, &[(0, 2), (2, 5)]);
    b.write(dir.path()).unwrap();

    let engine = BlockEngine::<u32>::open(config(dir.path())).unwrap();
    sssp::run(&engine, 0);
    assert_eq!(engine.state().snapshot_read(), vec![0, 1, 1, 2, 3]);
    engine.stop().unwrap();
}

#[test]
fn sssp_leaves_unreachable_vertices_at_max() {
    let dir = tempfile::tempdir().unwrap();
    let mut b = GraphBuilder::new(3).offset_ratio(2);
    b.edge(0, 1);
    b.single_block(1);
    b.write(dir.path()).unwrap();

    let engine = BlockEngine::<u32>::open(config(dir.path())).unwrap();
    sssp::run(&engine, 0);
    assert_eq!(
        engine.state().snapshot_read(),
        vec![0, 1, sssp::UNREACHED]
    );
    engine.stop().unwrap();
}

#[test]
fn coloring_a_triangle_under_read_only_sync() {
    let dir = tempfile::tempdir().unwrap();
    let mut b = GraphBuilder::new(3).offset_ratio(2);
    b.undirected_edge(0, 1).undirected_edge(1, 2).undirected_edge(2, 0);
    b.single_block(1);
    b.write(dir.path()).unwrap();

    let mut cfg = config(dir.path());
    cfg.read_only_sync = true;
    let engine = BlockEngine::<u32>::open(cfg).unwrap();
    let settled = coloring::run(&engine, 10, 10_000);
    assert!(settled.is_some(), "coloring did not settle");

    let s = engine.state();
    let colors = [s.read(0), s.read(1), s.read(2)];
    for (u, v) in [(0usize, 1usize), (1, 2), (2, 0)] {
        assert_ne!(colors[u], colors[v], "edge ({u}, {v})");
    }
    engine.stop().unwrap();
}

#[test]
fn triangle_count_on_k4() {
    let dir = tempfile::tempdir().unwrap();
    // K4: all 12 directed edges, split across 2 blocks
    let mut b = GraphBuilder::new(4).offset_ratio(2);
    for u in 0..4u32 {
        for v in 0..4u32 {
            if u != v {
                b.edge(u, v);
            }
        }
    }
    b.block(0, 2, &[(0, 2)]);
    b.block(2, 4, &[(2, 4)]);
    b.write(dir.path()).unwrap();

    let mut cfg = config(dir.path());
    cfg.in_memory = true;
    let engine = BlockEngine::<u32>::open(cfg).unwrap();
    count::triangles(&engine);
    assert_eq!(engine.state().snapshot_read(), vec![6, 6, 6, 6]);
    engine.stop().unwrap();
}

#[test]
fn path_and_star_counts() {
    let dir = tempfile::tempdir().unwrap();
    // star centred on 0 with leaves 1..=3, undirected
    let mut b = GraphBuilder::new(4).offset_ratio(2);
    b.undirected_edge(0, 1).undirected_edge(0, 2).undirected_edge(0, 3);
    b.single_block(2);
    b.write(dir.path()).unwrap();

    let mut cfg = config(dir.path());
    cfg.in_memory = true;
    let engine = BlockEngine::<u32>::open(cfg).unwrap();

    // 2-hop paths: centre sees 3 leaves of degree 1 each; a leaf sees the
    // centre's 3 edges
    count::paths(&engine, 3);
    assert_eq!(engine.state().snapshot_read(), vec![3, 3, 3, 3]);

    count::stars(&engine);
    assert_eq!(engine.state().snapshot_read(), vec![3, 0, 0, 0]);
    engine.stop().unwrap();
}

#[test]
fn budget_stress_pagerank_matches_unbounded_run() {
    // 40-vertex directed ring in 1 block of 10 sub-blocks; each sub-block
    // holds 4 edges = 16 bytes. Budget of 2 sub-blocks.
    fn build(root: &Path) {
        let mut b = GraphBuilder::new(40).offset_ratio(4);
        for v in 0..40u32 {
            b.edge(v, (v + 1) % 40);
        }
        b.single_block(10);
        b.write(root).unwrap();
    }

    let run = |root: &Path, budget: u64| -> Vec<u32> {
        let mut cfg = config(root);
        cfg.edge_buffer_budget = budget;
        let engine = BlockEngine::<f32>::open(cfg).unwrap();
        pagerank::run(&engine, 3);
        assert!(engine.peak_resident_bytes() <= budget);
        let bits = engine
            .state()
            .snapshot_read()
            .into_iter()
            .map(f32::to_bits)
            .collect();
        engine.stop().unwrap();
        bits
    };

    let tight = tempfile::tempdir().unwrap();
    build(tight.path());
    let loose = tempfile::tempdir().unwrap();
    build(loose.path());

    // every vertex's pull happens inside its own sub-block's task, so the
    // result is bit-identical whatever the streaming order was
    let constrained = run(tight.path(), 32);
    let unbounded = run(loose.path(), 1 << 20);
    assert_eq!(constrained, unbounded);
}

#[test]
fn mst_labels_components_with_their_minimum() {
    let dir = tempfile::tempdir().unwrap();
    // two components: a triangle {0,1,2} and an edge {3,4}
    let mut b = GraphBuilder::new(5).offset_ratio(2);
    b.undirected_edge(0, 1)
        .undirected_edge(1, 2)
        .undirected_edge(0, 2)
        .undirected_edge(3, 4);
    b.block(0, 3, &[(0, 3)]);
    b.block(3, 5, &[(3, 5)]);
    b.write(dir.path()).unwrap();

    let engine = BlockEngine::<u32>::open(config(dir.path())).unwrap();
    mst::run(&engine);
    assert_eq!(engine.state().snapshot_read(), vec![0, 0, 0, 3, 3]);
    assert_eq!(engine.remaining_edges(), 0);
    engine.stop().unwrap();
}

#[test]
fn random_walks_follow_edges() {
    let dir = tempfile::tempdir().unwrap();
    // directed ring: the only walk from v is v+1, v+2, ...
    let mut b = GraphBuilder::new(6).offset_ratio(2);
    for v in 0..6u32 {
        b.edge(v, (v + 1) % 6);
    }
    b.single_block(2);
    b.write(dir.path()).unwrap();

    let mut cfg = config(dir.path());
    cfg.in_memory = true;
    let engine = BlockEngine::<u32>::open(cfg).unwrap();
    let walk_len = 4;
    let matrix = random_walk::run(&engine, walk_len);
    for v in 0..6u32 {
        for step in 0..walk_len {
            assert_eq!(
                matrix[v as usize * walk_len + step],
                (v + 1 + step as u32) % 6
            );
        }
    }
    engine.stop().unwrap();
}
