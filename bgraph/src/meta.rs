//! Graph metadata: the `meta.yaml` description of the partitioned layout.
//!
//! The metadata is immutable for the lifetime of a run. Edge counts of
//! mutated blocks change on disk (`.new` siblings), but the vertex ranges
//! and sub-block boundaries never do; current per-block edge counts live in
//! the published [`crate::graph::BlockIndex`] snapshots.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubBlockMeta {
    pub id: SubBlockId,
    pub begin_id: VertexId,
    pub end_id: VertexId,
    pub num_edges: u64,
    /// Block-local edge offset of this sub-block's first edge.
    pub begin_offset: EdgeIndex,
}

impl SubBlockMeta {
    pub fn size_bytes(&self) -> u64 {
        self.num_edges * EDGE_BYTES
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockMeta {
    pub id: BlockId,
    pub begin_id: VertexId,
    pub end_id: VertexId,
    pub num_vertices: VertexCount,
    pub num_edges: u64,
    /// Vertices per reduced-offset entry in `index.bin`.
    pub offset_ratio: u32,
    pub num_sub_blocks: u32,
    pub sub_blocks: Vec<SubBlockMeta>,
}

impl BlockMeta {
    pub fn num_offsets(&self) -> u64 {
        (u64::from(self.num_vertices) + u64::from(self.offset_ratio) - 1)
            / u64::from(self.offset_ratio)
    }

    pub fn index_bytes(&self) -> u64 {
        self.num_offsets() * OFFSET_BYTES + u64::from(self.num_vertices) * DEGREE_BYTES
    }

    /// index.bin plus all sub-block edge files.
    pub fn size_bytes(&self) -> u64 {
        self.index_bytes() + self.num_edges * EDGE_BYTES
    }

    pub fn max_sub_block_bytes(&self) -> u64 {
        self.sub_blocks
            .iter()
            .map(SubBlockMeta::size_bytes)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMeta {
    pub num_vertices: VertexCount,
    pub num_edges: u64,
    pub num_blocks: u32,
    pub blocks: Vec<BlockMeta>,
}

impl GraphMeta {
    /// Loads and validates `<root>/meta.yaml`. Any missing file or
    /// inconsistent field aborts the run before a worker starts.
    pub fn load(root: &Path) -> Result<Self> {
        let path = meta_path(root);
        let file = File::open(&path).map_err(|e| Error::io(&path, e))?;
        let meta: GraphMeta = serde_yaml::from_reader(file)
            .map_err(|e| Error::Metadata(format!("{}: {e}", path.display())))?;
        meta.validate()?;
        Ok(meta)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = meta_path(root);
        let file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        serde_yaml::to_writer(file, self)
            .map_err(|e| Error::Metadata(format!("{}: {e}", path.display())))
    }

    fn validate(&self) -> Result<()> {
        let err = |msg: String| Err(Error::Metadata(msg));
        if self.blocks.len() != self.num_blocks as usize {
            return err(format!(
                "num_blocks is {} but {} block records present",
                self.num_blocks,
                self.blocks.len()
            ));
        }
        let mut next_vertex = 0;
        let mut total_edges = 0u64;
        for (i, b) in self.blocks.iter().enumerate() {
            if b.id != i as BlockId {
                return err(format!("block {i} carries id {}", b.id));
            }
            if b.begin_id != next_vertex || b.end_id <= b.begin_id {
                return err(format!(
                    "block {i} range [{}, {}) does not continue at {next_vertex}",
                    b.begin_id, b.end_id
                ));
            }
            if b.end_id - b.begin_id != b.num_vertices {
                return err(format!("block {i} num_vertices mismatch"));
            }
            if b.offset_ratio == 0 {
                return err(format!("block {i} has offset_ratio 0"));
            }
            if b.sub_blocks.len() != b.num_sub_blocks as usize {
                return err(format!("block {i} sub-block count mismatch"));
            }
            let mut next_sub_vertex = b.begin_id;
            let mut next_offset = 0u64;
            let mut block_edges = 0u64;
            for (j, s) in b.sub_blocks.iter().enumerate() {
                if s.id != j as SubBlockId {
                    return err(format!("block {i} sub-block {j} carries id {}", s.id));
                }
                if s.begin_id != next_sub_vertex || s.end_id <= s.begin_id {
                    return err(format!("block {i} sub-block {j} range broken"));
                }
                if s.begin_offset != next_offset {
                    return err(format!("block {i} sub-block {j} begin_offset broken"));
                }
                next_sub_vertex = s.end_id;
                next_offset += s.num_edges;
                block_edges += s.num_edges;
            }
            if next_sub_vertex != b.end_id {
                return err(format!("block {i} sub-blocks do not cover its range"));
            }
            if block_edges != b.num_edges {
                return err(format!("block {i} edge count mismatch"));
            }
            next_vertex = b.end_id;
            total_edges += b.num_edges;
        }
        if next_vertex != self.num_vertices {
            return err(format!(
                "blocks cover {next_vertex} vertices, metadata says {}",
                self.num_vertices
            ));
        }
        if total_edges != self.num_edges {
            return err(format!(
                "blocks carry {total_edges} edges, metadata says {}",
                self.num_edges
            ));
        }
        Ok(())
    }

    /// Block owning `v`. Panics on an out-of-range id (logic bug).
    pub fn block_of(&self, v: VertexId) -> BlockId {
        debug_assert!(v < self.num_vertices);
        match self.blocks.binary_search_by(|b| {
            if v < b.begin_id {
                std::cmp::Ordering::Greater
            } else if v >= b.end_id {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Equal
            }
        }) {
            Ok(i) => i as BlockId,
            Err(_) => panic!("vertex {v} is out of range"),
        }
    }

    pub fn max_sub_block_bytes(&self) -> u64 {
        self.blocks
            .iter()
            .map(BlockMeta::max_sub_block_bytes)
            .max()
            .unwrap_or(0)
    }
}

pub fn meta_path(root: &Path) -> PathBuf {
    root.join("meta.yaml")
}

pub fn block_dir(root: &Path, block: BlockId) -> PathBuf {
    root.join("graphs").join(format!("{block}_blocks"))
}

pub fn index_path(root: &Path, block: BlockId, mutated: bool) -> PathBuf {
    let name = if mutated { "index.bin.new" } else { "index.bin" };
    block_dir(root, block).join(name)
}

pub fn sub_block_path(root: &Path, block: BlockId, sub: SubBlockId, mutated: bool) -> PathBuf {
    let name = if mutated {
        format!("{sub}.bin.new")
    } else {
        format!("{sub}.bin")
    };
    block_dir(root, block).join(name)
}
