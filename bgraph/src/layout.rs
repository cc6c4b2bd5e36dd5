//! On-disk block layout: reading and writing `index.bin` and the per
//! sub-block edge files, plus a small builder that materializes a graph
//! into the layout (the partitioner proper is a separate tool; the writer
//! here is what the mutation path and the test fixtures share).

use std::fs;
use std::io::Write;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::graph::BlockIndex;
use crate::meta::{self, BlockMeta, GraphMeta, SubBlockMeta};
use crate::types::*;

pub fn read_index(root: &Path, meta: &BlockMeta, mutated: bool) -> Result<BlockIndex> {
    let path = meta::index_path(root, meta.id, mutated);
    let bytes = fs::read(&path).map_err(|e| Error::io(&path, e))?;
    BlockIndex::decode(meta, &bytes)
}

pub fn write_index_bytes(root: &Path, block: BlockId, bytes: &[u8], mutated: bool) -> Result<u64> {
    let path = meta::index_path(root, block, mutated);
    fs::write(&path, bytes).map_err(|e| Error::io(&path, e))?;
    Ok(bytes.len() as u64)
}

pub fn encode_edges(edges: &[VertexId]) -> Vec<u8> {
    let mut out = vec![0u8; edges.len() * EDGE_BYTES as usize];
    LittleEndian::write_u32_into(edges, &mut out);
    out
}

pub fn write_sub_edges(
    root: &Path,
    block: BlockId,
    sub: SubBlockId,
    edges: &[VertexId],
    mutated: bool,
) -> Result<u64> {
    let path = meta::sub_block_path(root, block, sub, mutated);
    let bytes = encode_edges(edges);
    let mut f = fs::File::create(&path).map_err(|e| Error::io(&path, e))?;
    f.write_all(&bytes).map_err(|e| Error::io(&path, e))?;
    Ok(bytes.len() as u64)
}

pub fn read_sub_edges(root: &Path, block: BlockId, sub: SubBlockId, mutated: bool) -> Result<Vec<VertexId>> {
    let path = meta::sub_block_path(root, block, sub, mutated);
    let bytes = fs::read(&path).map_err(|e| Error::io(&path, e))?;
    if bytes.len() % EDGE_BYTES as usize != 0 {
        return Err(Error::Metadata(format!(
            "{}: length {} is not a multiple of {}",
            path.display(),
            bytes.len(),
            EDGE_BYTES
        )));
    }
    let mut edges = vec![0u32; bytes.len() / EDGE_BYTES as usize];
    LittleEndian::read_u32_into(&bytes, &mut edges);
    Ok(edges)
}

/// Materializes an adjacency-list graph into the block layout under a
/// root directory: `meta.yaml`, `graphs/<b>_blocks/index.bin` and
/// `graphs/<b>_blocks/<s>.bin`.
pub struct GraphBuilder {
    num_vertices: VertexCount,
    adjacency: Vec<Vec<VertexId>>,
    offset_ratio: u32,
    /// (begin, end, sub-block bounds)
    blocks: Vec<(VertexId, VertexId, Vec<(VertexId, VertexId)>)>,
}

impl GraphBuilder {
    pub fn new(num_vertices: VertexCount) -> Self {
        GraphBuilder {
            num_vertices,
            adjacency: vec![Vec::new(); num_vertices as usize],
            offset_ratio: 64,
            blocks: Vec::new(),
        }
    }

    pub fn offset_ratio(mut self, ratio: u32) -> Self {
        self.offset_ratio = ratio;
        self
    }

    pub fn edge(&mut self, u: VertexId, v: VertexId) -> &mut Self {
        self.adjacency[u as usize].push(v);
        self
    }

    /// Adds both directions; most fixtures model undirected graphs.
    pub fn undirected_edge(&mut self, u: VertexId, v: VertexId) -> &mut Self {
        self.edge(u, v).edge(v, u)
    }

    pub fn block(&mut self, begin: VertexId, end: VertexId, sub_bounds: &[(VertexId, VertexId)]) -> &mut Self {
        self.blocks.push((begin, end, sub_bounds.to_vec()));
        self
    }

    /// One block covering all vertices, split into `num_subs` near-even
    /// sub-blocks.
    pub fn single_block(&mut self, num_subs: u32) -> &mut Self {
        let n = self.num_vertices;
        let per = (n + num_subs - 1) / num_subs;
        let bounds: Vec<_> = (0..num_subs)
            .map(|i| (i * per, ((i + 1) * per).min(n)))
            .collect();
        self.block(0, n, &bounds)
    }

    pub fn write(&self, root: &Path) -> Result<GraphMeta> {
        let mut adjacency = self.adjacency.clone();
        for a in &mut adjacency {
            a.sort_unstable();
        }
        let mut blocks = Vec::new();
        let mut total_edges = 0u64;
        for (bid, (begin, end, sub_bounds)) in self.blocks.iter().enumerate() {
            let bid = bid as BlockId;
            let dir = meta::block_dir(root, bid);
            fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
            let degrees: Vec<VertexDegree> = (*begin..*end)
                .map(|v| adjacency[v as usize].len() as VertexDegree)
                .collect();
            let idx = BlockIndex::build(bid, *begin, *end, self.offset_ratio, degrees, sub_bounds);
            write_index_bytes(root, bid, &idx.encode(), false)?;
            let mut sub_blocks = Vec::new();
            for (sid, sr) in idx.subs.iter().enumerate() {
                let sid = sid as SubBlockId;
                let edges: Vec<VertexId> = (sr.begin_id..sr.end_id)
                    .flat_map(|v| adjacency[v as usize].iter().copied())
                    .collect();
                write_sub_edges(root, bid, sid, &edges, false)?;
                sub_blocks.push(SubBlockMeta {
                    id: sid,
                    begin_id: sr.begin_id,
                    end_id: sr.end_id,
                    num_edges: sr.num_edges,
                    begin_offset: sr.begin_offset,
                });
            }
            total_edges += idx.num_edges;
            blocks.push(BlockMeta {
                id: bid,
                begin_id: *begin,
                end_id: *end,
                num_vertices: end - begin,
                num_edges: idx.num_edges,
                offset_ratio: self.offset_ratio,
                num_sub_blocks: sub_blocks.len() as u32,
                sub_blocks,
            });
        }
        let meta = GraphMeta {
            num_vertices: self.num_vertices,
            num_edges: total_edges,
            num_blocks: blocks.len() as u32,
            blocks,
        };
        meta.save(root)?;
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_writes_a_loadable_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = GraphBuilder::new(4).offset_ratio(2);
        b.edge(0, 1).edge(1, 0).edge(1, 2).edge(2, 3).edge(3, 0);
        b.block(0, 4, &[(0, 2), (2, 4)]);
        let meta = b.write(dir.path()).unwrap();
        assert_eq!(meta.num_edges, 5);
        assert_eq!(meta.blocks[0].sub_blocks[0].num_edges, 3);

        let loaded = GraphMeta::load(dir.path()).unwrap();
        let idx = read_index(dir.path(), &loaded.blocks[0], false).unwrap();
        assert_eq!(idx.degrees, vec![1, 2, 1, 1]);
        assert_eq!(idx.out_offset(2), 3);
        assert_eq!(read_sub_edges(dir.path(), 0, 0, false).unwrap(), vec![1, 0, 2]);
        assert_eq!(read_sub_edges(dir.path(), 0, 1, false).unwrap(), vec![3, 0]);
    }

    #[test]
    fn write_then_read_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = GraphBuilder::new(3).offset_ratio(2);
        b.edge(0, 1).edge(0, 2).edge(2, 1);
        b.single_block(1);
        b.write(dir.path()).unwrap();

        let meta = GraphMeta::load(dir.path()).unwrap();
        let idx = read_index(dir.path(), &meta.blocks[0], false).unwrap();
        let edges = read_sub_edges(dir.path(), 0, 0, false).unwrap();
        // rewrite unmodified as the mutated siblings, then reread
        write_index_bytes(dir.path(), 0, &idx.encode(), true).unwrap();
        write_sub_edges(dir.path(), 0, 0, &edges, true).unwrap();
        let idx2 = read_index(dir.path(), &meta.blocks[0], true).unwrap();
        assert_eq!(idx2.encode(), idx.encode());
        assert_eq!(read_sub_edges(dir.path(), 0, 0, true).unwrap(), edges);
    }

    #[test]
    fn single_block_splits_evenly() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = GraphBuilder::new(10);
        b.single_block(3);
        let meta = b.write(dir.path()).unwrap();
        let bounds: Vec<_> = meta.blocks[0]
            .sub_blocks
            .iter()
            .map(|s| (s.begin_id, s.end_id))
            .collect();
        assert_eq!(bounds, vec![(0, 4), (4, 8), (8, 10)]);
    }
}
