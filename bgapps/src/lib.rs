//! Graph algorithms expressed against the bgraph map primitives, plus the
//! shared CLI surface of the algorithm binaries.

pub mod coloring;
pub mod count;
pub mod mst;
pub mod opts;
pub mod pagerank;
pub mod random_walk;
pub mod sssp;
pub mod wcc;
