//! Uniform random walks: one walk of `walk_len` steps from every vertex,
//! recorded into a dense vertex × step matrix. Runs in in-memory mode so a
//! walk can hop across blocks.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bgraph::{BlockEngine, VertexId};
use rand::Rng;

/// A walk that stops early (dead end) leaves `NO_STEP` in the remaining
/// cells.
pub const NO_STEP: u32 = u32::MAX;

pub fn run(engine: &BlockEngine<u32>, walk_len: usize) -> Vec<VertexId> {
    let n = engine.num_vertices() as usize;
    let matrix: Arc<Vec<AtomicU32>> =
        Arc::new((0..n * walk_len).map(|_| AtomicU32::new(NO_STEP)).collect());

    // warm-up: make every block's edges resident
    let s = engine.state();
    engine.map_vertex_with_edges(move |v| s.write(v, v));

    let g = engine.view();
    let m = matrix.clone();
    engine.map_vertex(move |v| {
        let mut rng = rand::thread_rng();
        let mut cur = v;
        for step in 0..walk_len {
            let Some(edges) = g.out_edges(cur) else {
                break;
            };
            if edges.is_empty() {
                break;
            }
            cur = edges[rng.gen_range(0..edges.len())];
            m[v as usize * walk_len + step].store(cur, Ordering::Relaxed);
        }
    });

    matrix.iter().map(|c| c.load(Ordering::Relaxed)).collect()
}
