//! Local structure counting: triangles, fixed-length paths, stars.
//!
//! These kernels chase edges of vertices outside the current sub-block
//! (a neighbour's adjacency list, a neighbour's degree), so they run the
//! engine in in-memory mode where every sub-block stays resident after the
//! warm-up map. Adjacency lists are id-sorted on disk, which makes the
//! membership probe a binary search.

use bgraph::BlockEngine;

/// Warm-up: stream every block once so all edge data is resident.
fn warm(engine: &BlockEngine<u32>) {
    let s = engine.state();
    engine.map_vertex_with_edges(move |v| s.write(v, 0));
}

/// Ordered pairs of adjacent neighbours per vertex; on `K4` every vertex
/// counts 3·2 of them.
pub fn triangles(engine: &BlockEngine<u32>) {
    warm(engine);
    let s = engine.state();
    let g = engine.view();
    engine.map_vertex_with_edges(move |v| {
        let Some(edges) = g.out_edges(v) else {
            return;
        };
        let mut sum = 0u32;
        for (i, &a) in edges.iter().enumerate() {
            let Some(a_edges) = g.out_edges(a) else {
                continue;
            };
            for (j, &b) in edges.iter().enumerate() {
                if i != j && a_edges.binary_search(&b).is_ok() {
                    sum += 1;
                }
            }
        }
        s.write(v, sum);
    });
}

/// Counts paths of `length` vertices starting at each vertex: seed with
/// 2-hop counts (sum of neighbour degrees), then fold neighbour counts
/// once per extra hop.
pub fn paths(engine: &BlockEngine<u32>, length: u32) {
    warm(engine);
    let s = engine.state();
    let g = engine.view();
    engine.map_vertex_with_edges(move |v| {
        let Some(edges) = g.out_edges(v) else {
            return;
        };
        let sum = edges.iter().map(|&u| g.out_degree(u)).sum();
        s.write(v, sum);
    });
    for _ in 3..length {
        let s = engine.state();
        let g = engine.view();
        engine.map_vertex_with_edges(move |v| {
            let Some(edges) = g.out_edges(v) else {
                return;
            };
            let sum = edges.iter().map(|&u| s.read(u)).sum();
            s.write(v, sum);
        });
    }
}

/// Unordered neighbour pairs centred on each vertex.
pub fn stars(engine: &BlockEngine<u32>) {
    let s = engine.state();
    let g = engine.view();
    engine.map_vertex(move |v| {
        let d = g.out_degree(v);
        s.write(v, d * d.saturating_sub(1) / 2);
    });
}
