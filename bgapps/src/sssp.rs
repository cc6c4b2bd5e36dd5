//! Single-source shortest paths by hop count: BSP Bellman-Ford over the
//! min-combining writer, looping until a superstep relaxes nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bgraph::{BlockEngine, VertexId};
use log::debug;

pub const UNREACHED: u32 = u32::MAX;

/// Returns the number of relax supersteps (including the final empty one).
pub fn run(engine: &BlockEngine<u32>, source: VertexId) -> u32 {
    let s = engine.state();
    engine.map_vertex(move |v| s.write(v, if v == source { 0 } else { UNREACHED }));

    let mut rounds = 0;
    loop {
        let changed = Arc::new(AtomicBool::new(false));
        let s = engine.state();
        let c = changed.clone();
        engine.map_edge(move |u, v| {
            let du = s.read(u);
            if du != UNREACHED && du + 1 < s.read(v) {
                s.write_min(v, du + 1);
                c.store(true, Ordering::Relaxed);
            }
        });
        rounds += 1;
        if !changed.load(Ordering::Relaxed) {
            break;
        }
        debug!("sssp round {rounds} relaxed something");
    }
    rounds
}
