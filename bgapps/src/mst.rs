//! Borůvka-style minimum spanning forest over id-weighted edges.
//!
//! Each round every vertex nominates its smallest adjacent vertex, the
//! nominations hook components together through the min-combine, parent
//! chains are flattened, and intra-component edges are contracted away.
//! The parent labels converge to one representative per component.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bgraph::{BlockEngine, VertexId};
use log::debug;

const NO_EDGE: u32 = u32::MAX;

pub fn run(engine: &BlockEngine<u32>) -> u32 {
    let n = engine.num_vertices() as usize;
    let min_edge: Arc<Vec<AtomicU32>> = Arc::new((0..n).map(|_| AtomicU32::new(NO_EDGE)).collect());

    let s = engine.state();
    engine.map_vertex(move |v| s.write(v, v));

    let mut rounds = 0;
    while engine.remaining_edges() > 0 {
        let g = engine.view();
        let me = min_edge.clone();
        engine.map_vertex_with_edges(move |v| {
            if g.out_degree(v) == 0 {
                return;
            }
            let Some(edges) = g.out_edges(v) else {
                return;
            };
            let mut nearest = NO_EDGE;
            for &dst in edges.iter() {
                me[dst as usize].fetch_min(v, Ordering::Relaxed);
                nearest = nearest.min(dst);
            }
            me[v as usize].fetch_min(nearest, Ordering::Relaxed);
        });

        let s = engine.state();
        let me = min_edge.clone();
        engine.map_vertex(move |v| {
            let dst = me[v as usize].swap(NO_EDGE, Ordering::Relaxed);
            if dst == NO_EDGE {
                return;
            }
            let vp = s.read(v);
            let dp = s.read(dst);
            if vp < dp {
                s.write_min(dp, vp);
            } else if vp > dp {
                s.write_min(vp, dp);
            }
        });

        let s = engine.state();
        engine.map_vertex(move |v| {
            let mut parent = s.read(v);
            if parent == v {
                return;
            }
            while parent != s.read(parent) {
                parent = s.read(parent);
            }
            s.write_min(v, parent);
        });

        let s = engine.state();
        engine.map_edge_and_mutate(move |u, v| s.read(u) == s.read(v));

        rounds += 1;
        debug!("mst round {rounds}: {} edges left", engine.remaining_edges());
    }
    let s = engine.state();
    engine.map_vertex(move |v| {
        let mut parent = s.read(v);
        while parent != s.read(parent) {
            parent = s.read(parent);
        }
        s.write_min(v, parent);
    });
    rounds
}

/// Representative of `v`'s component after a finished run.
pub fn component(engine: &BlockEngine<u32>, v: VertexId) -> VertexId {
    engine.state().read(v)
}
