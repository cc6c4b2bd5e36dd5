//! Pull-based PageRank with damping 0.85.
//!
//! Between iterations a vertex's value holds its rank divided by its
//! out-degree, so the pull step is a plain sum over the stored neighbour
//! values; the final iteration leaves the undivided rank in place.

use bgraph::BlockEngine;
use log::debug;

pub const DAMPING: f32 = 0.85;
pub const LAMBDA: f32 = 1.0 - DAMPING;

pub fn run(engine: &BlockEngine<f32>, iterations: u32) {
    let s = engine.state();
    let g = engine.view();
    engine.map_vertex(move |v| {
        let d = g.out_degree(v);
        s.write(v, if d > 0 { 1.0 / d as f32 } else { 1.0 });
    });

    for step in 0..iterations {
        // write[] is the pull accumulator this round
        engine.state().reset_write(0.0);

        let s = engine.state();
        engine.map_edge(move |u, v| s.write_add(u, s.read(v)));

        let s = engine.state();
        let g = engine.view();
        let last = step + 1 == iterations;
        engine.map_vertex(move |v| {
            let rank = DAMPING * s.read(v) + LAMBDA;
            let d = g.out_degree(v);
            s.write(v, if last || d == 0 { rank } else { rank / d as f32 });
        });
        debug!("pagerank step {step} done");
    }
}
