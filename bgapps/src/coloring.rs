//! Randomized greedy coloring.
//!
//! Declares the read-only sync contract: reads and writes go to the same
//! array on purpose, so a recolor is visible to the conflict checks of the
//! same superstep. Every vertex starts at color 0; each round the
//! higher-id endpoint of a conflicting edge redraws uniformly from
//! `0..rand_max`, until a round finds no conflict.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bgraph::BlockEngine;
use log::debug;
use rand::Rng;

/// Returns the number of rounds taken, or `None` if `max_rounds` passed
/// without a conflict-free round.
pub fn run(engine: &BlockEngine<u32>, rand_max: u32, max_rounds: u32) -> Option<u32> {
    let s = engine.state();
    engine.map_vertex(move |v| s.write(v, 0));

    for round in 1..=max_rounds {
        let conflicts = Arc::new(AtomicBool::new(false));
        let s = engine.state();
        let c = conflicts.clone();
        engine.map_edge(move |u, v| {
            if u > v && s.read(u) == s.read(v) {
                s.write(u, rand::thread_rng().gen_range(0..rand_max));
                c.store(true, Ordering::Relaxed);
            }
        });
        if !conflicts.load(Ordering::Relaxed) {
            debug!("coloring settled after {round} rounds");
            return Some(round);
        }
    }
    None
}
