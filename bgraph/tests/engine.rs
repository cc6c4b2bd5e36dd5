//! End-to-end engine tests over small on-disk fixtures: the map
//! primitives' exactly-once guarantees, the sync laws, budget boundaries,
//! and the mutate/rewrite path.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use bgraph::config::EngineConfig;
use bgraph::engine::BlockEngine;
use bgraph::layout::{self, GraphBuilder};
use bgraph::meta::GraphMeta;

fn small_config(root: &std::path::Path) -> EngineConfig {
    let mut cfg = EngineConfig::new(root);
    cfg.parallelism = 2;
    cfg.memory_budget = 1 << 20;
    cfg.edge_buffer_budget = 1 << 20;
    cfg
}

/// 6 vertices in 2 blocks of 2 sub-blocks; edges form two directed cycles
/// 0->1->2->0 and 3->4->5->3 plus a bridge 2->3. Vertex 5's second edge
/// keeps one degree-2 vertex around.
fn cycles_fixture(root: &std::path::Path) -> GraphMeta {
    let mut b = GraphBuilder::new(6).offset_ratio(2);
    b.edge(0, 1)
        .edge(1, 2)
        .edge(2, 0)
        .edge(2, 3)
        .edge(3, 4)
        .edge(4, 5)
        .edge(5, 3)
        .edge(5, 0);
    b.block(0, 3, &[(0, 2), (2, 3)]);
    b.block(3, 6, &[(3, 5), (5, 6)]);
    b.write(root).unwrap()
}

#[test]
fn map_vertex_visits_every_vertex_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    cycles_fixture(dir.path());
    let engine = BlockEngine::<u32>::open(small_config(dir.path())).unwrap();

    let visits: Arc<Vec<AtomicU32>> = Arc::new((0..6).map(|_| AtomicU32::new(0)).collect());
    let v2 = visits.clone();
    engine.map_vertex(move |v| {
        v2[v as usize].fetch_add(1, Ordering::Relaxed);
    });
    for v in 0..6 {
        assert_eq!(visits[v].load(Ordering::Relaxed), 1, "vertex {v}");
    }
    engine.stop().unwrap();
}

#[test]
fn map_edge_enumerates_each_edge_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let meta = cycles_fixture(dir.path());
    let engine = BlockEngine::<u32>::open(small_config(dir.path())).unwrap();

    let n = 6usize;
    let seen: Arc<Vec<AtomicU32>> = Arc::new((0..n * n).map(|_| AtomicU32::new(0)).collect());
    let s2 = seen.clone();
    engine.map_edge(move |u, v| {
        s2[u as usize * 6 + v as usize].fetch_add(1, Ordering::Relaxed);
    });

    let expect = [(0, 1), (1, 2), (2, 0), (2, 3), (3, 4), (4, 5), (5, 3), (5, 0)];
    let mut total = 0;
    for u in 0..n {
        for v in 0..n {
            let count = seen[u * n + v].load(Ordering::Relaxed);
            let expected = u32::from(expect.contains(&(u as u32, v as u32)));
            assert_eq!(count, expected, "edge ({u}, {v})");
            total += count;
        }
    }
    assert_eq!(u64::from(total), meta.num_edges);
    engine.stop().unwrap();
}

#[test]
fn degree_zero_vertex_is_mapped_but_has_no_edges() {
    let dir = tempfile::tempdir().unwrap();
    // vertex 2 has no out-edges
    let mut b = GraphBuilder::new(3).offset_ratio(2);
    b.edge(0, 1).edge(1, 0);
    b.single_block(1);
    b.write(dir.path()).unwrap();
    let engine = BlockEngine::<u32>::open(small_config(dir.path())).unwrap();

    let vertex_calls = Arc::new(AtomicUsize::new(0));
    let c = vertex_calls.clone();
    engine.map_vertex(move |v| {
        if v == 2 {
            c.fetch_add(1, Ordering::Relaxed);
        }
    });
    assert_eq!(vertex_calls.load(Ordering::Relaxed), 1);

    let edge_calls = Arc::new(AtomicUsize::new(0));
    let c = edge_calls.clone();
    engine.map_edge(move |u, _| {
        if u == 2 {
            c.fetch_add(1, Ordering::Relaxed);
        }
    });
    assert_eq!(edge_calls.load(Ordering::Relaxed), 0);
    engine.stop().unwrap();
}

#[test]
fn identity_map_leaves_read_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    cycles_fixture(dir.path());
    let engine = BlockEngine::<u32>::open(small_config(dir.path())).unwrap();

    let s = engine.state();
    engine.map_vertex(move |v| s.write(v, v + 10));
    let before = engine.state().snapshot_read();
    assert_eq!(before, vec![10, 11, 12, 13, 14, 15]);

    let s = engine.state();
    engine.map_vertex(move |v| {
        let x = s.read(v);
        s.write(v, x);
    });
    assert_eq!(engine.state().snapshot_read(), before);
    engine.stop().unwrap();
}

#[test]
fn single_sub_block_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut b = GraphBuilder::new(2).offset_ratio(2);
    b.edge(0, 1).edge(1, 0);
    b.single_block(1);
    b.write(dir.path()).unwrap();
    let engine = BlockEngine::<u32>::open(small_config(dir.path())).unwrap();

    let edges = Arc::new(AtomicUsize::new(0));
    let c = edges.clone();
    engine.map_edge(move |_, _| {
        c.fetch_add(1, Ordering::Relaxed);
    });
    assert_eq!(edges.load(Ordering::Relaxed), 2);
    engine.stop().unwrap();
}

#[test]
fn budget_equal_to_largest_sub_block_still_flows() {
    let dir = tempfile::tempdir().unwrap();
    // 8 vertices, 1 block, 4 sub-blocks of 2 vertices with 2 edges each
    let mut b = GraphBuilder::new(8).offset_ratio(2);
    for v in 0..8u32 {
        b.edge(v, (v + 1) % 8);
    }
    b.single_block(4);
    b.write(dir.path()).unwrap();

    let mut cfg = small_config(dir.path());
    cfg.edge_buffer_budget = 8; // one sub-block = 2 edges = 8 bytes
    let engine = BlockEngine::<u32>::open(cfg).unwrap();

    let edges = Arc::new(AtomicUsize::new(0));
    let c = edges.clone();
    engine.map_edge(move |_, _| {
        c.fetch_add(1, Ordering::Relaxed);
    });
    assert_eq!(edges.load(Ordering::Relaxed), 8);
    assert!(engine.peak_resident_bytes() <= 8);
    engine.stop().unwrap();
}

#[test]
fn edge_buffer_smaller_than_a_sub_block_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    cycles_fixture(dir.path());
    let mut cfg = small_config(dir.path());
    cfg.edge_buffer_budget = 4;
    assert!(BlockEngine::<u32>::open(cfg).is_err());
}

#[test]
fn mutate_rewrites_consistent_new_files() {
    let dir = tempfile::tempdir().unwrap();
    let meta = cycles_fixture(dir.path());
    let engine = BlockEngine::<u32>::open(small_config(dir.path())).unwrap();
    assert_eq!(engine.remaining_edges(), 8);

    // delete every edge leaving vertex 2 and vertex 5
    engine.map_edge_and_mutate(move |u, _| u == 2 || u == 5);
    assert_eq!(engine.remaining_edges(), 4);

    // the next superstep sees only the surviving edges
    let seen = Arc::new(AtomicUsize::new(0));
    let c = seen.clone();
    engine.map_edge(move |u, _| {
        assert!(u != 2 && u != 5);
        c.fetch_add(1, Ordering::Relaxed);
    });
    assert_eq!(seen.load(Ordering::Relaxed), 4);
    engine.stop().unwrap();

    // and the .new files decode to a consistent CSR with the deletions
    let idx0 = layout::read_index(dir.path(), &meta.blocks[0], true).unwrap();
    assert_eq!(idx0.num_edges, 2);
    assert_eq!(idx0.degrees, vec![1, 1, 0]);
    assert_eq!(
        layout::read_sub_edges(dir.path(), 0, 0, true).unwrap(),
        vec![1, 2]
    );
    assert_eq!(
        layout::read_sub_edges(dir.path(), 0, 1, true).unwrap(),
        Vec::<u32>::new()
    );

    let idx1 = layout::read_index(dir.path(), &meta.blocks[1], true).unwrap();
    assert_eq!(idx1.num_edges, 2);
    assert_eq!(idx1.degrees, vec![1, 1, 0]);
    assert_eq!(
        layout::read_sub_edges(dir.path(), 1, 0, true).unwrap(),
        vec![4, 5]
    );
    assert_eq!(
        layout::read_sub_edges(dir.path(), 1, 1, true).unwrap(),
        Vec::<u32>::new()
    );
}

#[test]
fn in_memory_mode_keeps_blocks_resident() {
    let dir = tempfile::tempdir().unwrap();
    cycles_fixture(dir.path());
    let mut cfg = small_config(dir.path());
    cfg.in_memory = true;
    let engine = BlockEngine::<u32>::open(cfg).unwrap();

    for _ in 0..3 {
        let edges = Arc::new(AtomicUsize::new(0));
        let c = edges.clone();
        engine.map_edge(move |_, _| {
            c.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(edges.load(Ordering::Relaxed), 8);
    }
    // resident edge data can be chased from a plain vertex map
    let g = engine.view();
    let degs = Arc::new(AtomicUsize::new(0));
    let c = degs.clone();
    engine.map_vertex(move |v| {
        if let Some(e) = g.out_edges(v) {
            c.fetch_add(e.len(), Ordering::Relaxed);
        }
    });
    assert_eq!(degs.load(Ordering::Relaxed), 8);
    engine.stop().unwrap();
}

#[test]
fn in_memory_mutate_compacts_in_place() {
    let dir = tempfile::tempdir().unwrap();
    cycles_fixture(dir.path());
    let mut cfg = small_config(dir.path());
    cfg.in_memory = true;
    let engine = BlockEngine::<u32>::open(cfg).unwrap();

    engine.map_edge_and_mutate(move |u, v| u == 2 && v == 3);
    assert_eq!(engine.remaining_edges(), 7);

    let seen = Arc::new(AtomicUsize::new(0));
    let c = seen.clone();
    engine.map_edge(move |u, v| {
        assert!(!(u == 2 && v == 3));
        c.fetch_add(1, Ordering::Relaxed);
    });
    assert_eq!(seen.load(Ordering::Relaxed), 7);
    engine.stop().unwrap();

    // writeback is disabled in in-memory mode
    assert!(!bgraph::meta::index_path(dir.path(), 0, true).exists());
}

#[test]
fn short_cut_keeps_the_last_block_across_rounds() {
    let dir = tempfile::tempdir().unwrap();
    cycles_fixture(dir.path());
    let mut cfg = small_config(dir.path());
    cfg.short_cut = true;
    let engine = BlockEngine::<u32>::open(cfg).unwrap();

    for _ in 0..2 {
        let edges = Arc::new(AtomicUsize::new(0));
        let c = edges.clone();
        engine.map_edge(move |_, _| {
            c.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(edges.load(Ordering::Relaxed), 8);
    }
    engine.stop().unwrap();
}

#[test]
fn limits_admission_reads_one_block_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    cycles_fixture(dir.path());
    let mut cfg = small_config(dir.path());
    cfg.limits = 1;
    let engine = BlockEngine::<u32>::open(cfg).unwrap();

    let edges = Arc::new(AtomicUsize::new(0));
    let c = edges.clone();
    engine.map_edge(move |_, _| {
        c.fetch_add(1, Ordering::Relaxed);
    });
    assert_eq!(edges.load(Ordering::Relaxed), 8);
    engine.stop().unwrap();
}

#[test]
fn random_read_mode_covers_every_sub_block() {
    let dir = tempfile::tempdir().unwrap();
    cycles_fixture(dir.path());
    let mut cfg = small_config(dir.path());
    cfg.mode = bgraph::ReadMode::Random;
    let engine = BlockEngine::<u32>::open(cfg).unwrap();

    let edges = Arc::new(AtomicUsize::new(0));
    let c = edges.clone();
    engine.map_edge(move |_, _| {
        c.fetch_add(1, Ordering::Relaxed);
    });
    assert_eq!(edges.load(Ordering::Relaxed), 8);
    engine.stop().unwrap();
}
