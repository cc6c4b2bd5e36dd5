//! Weakly connected components: label every vertex with the smallest
//! vertex id in its component.
//!
//! Each round grafts neighbouring trees together through the min-combine,
//! flattens parent chains by pointer jumping, then deletes the edges that
//! have become intra-component. The engine's remaining-edge count drives
//! termination.

use bgraph::{BlockEngine, GraphView, VertexId, VertexState};
use log::debug;
use std::sync::Arc;

fn graft_vertex(s: &VertexState<u32>, g: &GraphView, v: VertexId) {
    if g.out_degree(v) == 0 {
        return;
    }
    let Some(edges) = g.out_edges(v) else {
        return;
    };
    let parent = s.read(v);
    let mut lowest = parent;
    for &u in edges.iter() {
        lowest = lowest.min(s.read(u));
    }
    for &u in edges.iter() {
        s.write_min(s.read(u), lowest);
    }
    s.write_min(parent, lowest);
}

fn point_jump(s: &VertexState<u32>, v: VertexId) {
    let mut parent = s.read(v);
    if parent == v {
        return;
    }
    while parent != s.read(parent) {
        parent = s.read(parent);
    }
    s.write_min(v, parent);
}

/// Runs to completion; returns the number of graft/jump/contract rounds.
pub fn run(engine: &BlockEngine<u32>) -> u32 {
    let s = engine.state();
    engine.map_vertex(move |v| s.write(v, v));

    let mut rounds = 0;
    while engine.remaining_edges() > 0 {
        let s = engine.state();
        let g = engine.view();
        engine.map_vertex_with_edges(move |v| graft_vertex(&s, &g, v));

        let s = engine.state();
        engine.map_vertex(move |v| point_jump(&s, v));

        let s = engine.state();
        engine.map_edge_and_mutate(move |u, v| s.read(u) == s.read(v));

        rounds += 1;
        debug!(
            "wcc round {rounds}: {} edges left",
            engine.remaining_edges()
        );
    }
    // flatten whatever chains the last contraction left behind
    let s = engine.state();
    engine.map_vertex(move |v| point_jump(&s, v));
    rounds
}

/// Component count over a finished run.
pub fn num_components(s: &Arc<VertexState<u32>>, num_vertices: u32) -> usize {
    (0..num_vertices).filter(|&v| s.read(v) == v).count()
}
