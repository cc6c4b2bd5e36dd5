//! In-memory view of one block: the resident index arrays (degrees +
//! reduced offsets) and the published, buffer-resident sub-block edge
//! arrays.
//!
//! Index snapshots and edge arrays are swapped in with `arc-swap`; readers
//! that obtained a sub-block id through the ready queue see the array the
//! reader published before signalling it.

use std::ops::Deref;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use byteorder::{ByteOrder, LittleEndian};

use crate::bitmap::Bitmap;
use crate::error::{Error, Result};
use crate::meta::BlockMeta;
use crate::types::*;

/// Current vertex/edge extent of one sub-block. Vertex bounds never change;
/// edge counts and offsets shrink when the block is mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubRange {
    pub begin_id: VertexId,
    pub end_id: VertexId,
    pub num_edges: u64,
    /// Block-local edge offset of this sub-block's first edge.
    pub begin_offset: EdgeIndex,
}

impl SubRange {
    pub fn size_bytes(&self) -> u64 {
        self.num_edges * EDGE_BYTES
    }
}

/// One decoded `index.bin`: the per-vertex degrees and the reduced offset
/// array, plus the derived per-sub-block extents.
#[derive(Debug, Clone)]
pub struct BlockIndex {
    pub block: BlockId,
    pub begin_id: VertexId,
    pub end_id: VertexId,
    pub offset_ratio: u32,
    pub num_edges: u64,
    pub reduced: Vec<EdgeIndex>,
    pub degrees: Vec<VertexDegree>,
    pub subs: Vec<SubRange>,
}

impl BlockIndex {
    /// Rebuilds the reduced offsets and sub-block extents from a degree
    /// array. Sub-block vertex bounds come from `bounds`.
    pub fn build(
        block: BlockId,
        begin_id: VertexId,
        end_id: VertexId,
        offset_ratio: u32,
        degrees: Vec<VertexDegree>,
        bounds: &[(VertexId, VertexId)],
    ) -> Self {
        debug_assert_eq!(degrees.len(), (end_id - begin_id) as usize);
        let ratio = offset_ratio as usize;
        let mut reduced = Vec::with_capacity((degrees.len() + ratio - 1) / ratio);
        let mut total = 0u64;
        for (i, &d) in degrees.iter().enumerate() {
            if i % ratio == 0 {
                reduced.push(total);
            }
            total += u64::from(d);
        }
        if degrees.is_empty() {
            reduced.push(0);
        }
        let mut subs = Vec::with_capacity(bounds.len());
        let mut offset = 0u64;
        for &(sb, se) in bounds {
            let edges: u64 = degrees[(sb - begin_id) as usize..(se - begin_id) as usize]
                .iter()
                .map(|&d| u64::from(d))
                .sum();
            subs.push(SubRange {
                begin_id: sb,
                end_id: se,
                num_edges: edges,
                begin_offset: offset,
            });
            offset += edges;
        }
        BlockIndex {
            block,
            begin_id,
            end_id,
            offset_ratio,
            num_edges: total,
            reduced,
            degrees,
            subs,
        }
    }

    /// Parses raw `index.bin` bytes. Sub-block extents are derived from the
    /// decoded degrees, so a post-mutation index needs no metadata update.
    pub fn decode(meta: &BlockMeta, bytes: &[u8]) -> Result<Self> {
        let num_offsets = meta.num_offsets() as usize;
        let nv = meta.num_vertices as usize;
        let want = num_offsets * OFFSET_BYTES as usize + nv * DEGREE_BYTES as usize;
        if bytes.len() != want {
            return Err(Error::BadIndex {
                block: meta.id,
                got: bytes.len(),
                want,
            });
        }
        let (off_bytes, deg_bytes) = bytes.split_at(num_offsets * OFFSET_BYTES as usize);
        let mut reduced = vec![0u64; num_offsets];
        LittleEndian::read_u64_into(off_bytes, &mut reduced);
        let mut degrees = vec![0u32; nv];
        LittleEndian::read_u32_into(deg_bytes, &mut degrees);
        let bounds: Vec<_> = meta
            .sub_blocks
            .iter()
            .map(|s| (s.begin_id, s.end_id))
            .collect();
        let mut idx = Self::build(
            meta.id,
            meta.begin_id,
            meta.end_id,
            meta.offset_ratio,
            degrees,
            &bounds,
        );
        // keep the stored reduced offsets (build recomputed identical ones
        // for a consistent file)
        idx.reduced = reduced;
        Ok(idx)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out =
            vec![0u8; self.reduced.len() * OFFSET_BYTES as usize
                + self.degrees.len() * DEGREE_BYTES as usize];
        let split = self.reduced.len() * OFFSET_BYTES as usize;
        LittleEndian::write_u64_into(&self.reduced, &mut out[..split]);
        LittleEndian::write_u32_into(&self.degrees, &mut out[split..]);
        out
    }

    pub fn num_vertices(&self) -> VertexCount {
        self.end_id - self.begin_id
    }

    pub fn index_bytes(&self) -> u64 {
        self.reduced.len() as u64 * OFFSET_BYTES + self.degrees.len() as u64 * DEGREE_BYTES
    }

    pub fn out_degree(&self, v: VertexId) -> VertexDegree {
        self.degrees[(v - self.begin_id) as usize]
    }

    /// Block-local edge offset of `v`'s first edge: the group's reduced
    /// offset plus the degrees of earlier vertices in the group. Bounded by
    /// `offset_ratio` additions.
    pub fn out_offset(&self, v: VertexId) -> EdgeIndex {
        let idx = (v - self.begin_id) as usize;
        let group = idx / self.offset_ratio as usize;
        let mut off = self.reduced[group];
        for &d in &self.degrees[group * self.offset_ratio as usize..idx] {
            off += u64::from(d);
        }
        off
    }

    pub fn sub_of(&self, v: VertexId) -> SubBlockId {
        debug_assert!(v >= self.begin_id && v < self.end_id);
        match self
            .subs
            .binary_search_by(|s| {
                if v < s.begin_id {
                    std::cmp::Ordering::Greater
                } else if v >= s.end_id {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            }) {
            Ok(i) => i as SubBlockId,
            Err(_) => panic!("vertex {v} not covered by block {}", self.block),
        }
    }
}

/// Borrow-free view of one vertex's out-edges; keeps the sub-block's edge
/// array alive while in use.
pub struct EdgeSlice {
    arc: Arc<Vec<VertexId>>,
    start: usize,
    len: usize,
}

impl Deref for EdgeSlice {
    type Target = [VertexId];

    fn deref(&self) -> &[VertexId] {
        &self.arc[self.start..self.start + self.len]
    }
}

pub struct BlockGraph {
    block: BlockId,
    index: ArcSwapOption<BlockIndex>,
    edges: Vec<ArcSwapOption<Vec<VertexId>>>,
    deleted: ArcSwapOption<Bitmap>,
}

impl BlockGraph {
    pub fn new(meta: &BlockMeta) -> Self {
        BlockGraph {
            block: meta.id,
            index: ArcSwapOption::empty(),
            edges: (0..meta.num_sub_blocks)
                .map(|_| ArcSwapOption::empty())
                .collect(),
            deleted: ArcSwapOption::empty(),
        }
    }

    pub fn block_id(&self) -> BlockId {
        self.block
    }

    pub fn num_sub_blocks(&self) -> u32 {
        self.edges.len() as u32
    }

    pub fn publish_index(&self, idx: BlockIndex) {
        self.index.store(Some(Arc::new(idx)));
    }

    pub fn index(&self) -> Arc<BlockIndex> {
        self.index
            .load_full()
            .unwrap_or_else(|| panic!("index of block {} not loaded", self.block))
    }

    pub fn publish_sub(&self, sub: SubBlockId, edges: Vec<VertexId>) {
        self.edges[sub as usize].store(Some(Arc::new(edges)));
    }

    pub fn sub_edges(&self, sub: SubBlockId) -> Option<Arc<Vec<VertexId>>> {
        self.edges[sub as usize].load_full()
    }

    pub fn release_sub(&self, sub: SubBlockId) {
        self.edges[sub as usize].store(None);
    }

    pub fn release_all_subs(&self) {
        for e in &self.edges {
            e.store(None);
        }
    }

    pub fn out_degree(&self, v: VertexId) -> VertexDegree {
        self.index().out_degree(v)
    }

    /// `v`'s out-edges, `None` while the owning sub-block is not resident.
    pub fn out_edges(&self, v: VertexId) -> Option<EdgeSlice> {
        let idx = self.index();
        let sub = idx.sub_of(v);
        let arc = self.sub_edges(sub)?;
        let sr = &idx.subs[sub as usize];
        let start = (idx.out_offset(v) - sr.begin_offset) as usize;
        let len = idx.out_degree(v) as usize;
        Some(EdgeSlice { arc, start, len })
    }

    /// Fresh deletion bitmap for a mutate round, sized to the current edge
    /// count.
    pub fn reset_deleted(&self) {
        let n = self.index().num_edges;
        self.deleted.store(Some(Arc::new(Bitmap::new(n))));
    }

    pub fn deleted(&self) -> Arc<Bitmap> {
        self.deleted
            .load_full()
            .unwrap_or_else(|| panic!("no deletion bitmap on block {}", self.block))
    }

    pub fn clear_deleted(&self) {
        self.deleted.store(None);
    }

    /// Filters a resident sub-block through the deletion bitmap. Returns
    /// the kept edges and the per-vertex deletion counts for the
    /// sub-block's vertex range.
    pub fn compact_sub(&self, sub: SubBlockId) -> (Vec<VertexId>, Vec<VertexDegree>) {
        let idx = self.index();
        let sr = &idx.subs[sub as usize];
        let edges = self
            .sub_edges(sub)
            .unwrap_or_else(|| panic!("compacting non-resident sub-block {sub}"));
        let bitmap = self.deleted();
        let mut kept = Vec::with_capacity(edges.len());
        let mut removed = vec![0u32; (sr.end_id - sr.begin_id) as usize];
        walk_sub(&idx, sub, &edges, |u, v, e| {
            if bitmap.get(e) {
                removed[(u - sr.begin_id) as usize] += 1;
            } else {
                kept.push(v);
            }
        });
        (kept, removed)
    }
}

/// Calls `f(src, dst, block_local_edge_index)` for every edge of the
/// sub-block, reconstructing sources from the degree array.
pub fn walk_sub(
    idx: &BlockIndex,
    sub: SubBlockId,
    edges: &[VertexId],
    mut f: impl FnMut(VertexId, VertexId, u64),
) {
    let sr = &idx.subs[sub as usize];
    debug_assert_eq!(edges.len() as u64, sr.num_edges);
    let mut i = 0usize;
    for u in sr.begin_id..sr.end_id {
        for _ in 0..idx.out_degree(u) {
            f(u, edges[i], sr.begin_offset + i as u64);
            i += 1;
        }
    }
    debug_assert_eq!(i, edges.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{BlockMeta, SubBlockMeta};

    // block of 6 vertices in [10, 16), two sub-blocks, degrees 2,0,3,1,0,2
    fn test_index() -> BlockIndex {
        BlockIndex::build(
            0,
            10,
            16,
            2,
            vec![2, 0, 3, 1, 0, 2],
            &[(10, 13), (13, 16)],
        )
    }

    fn test_meta() -> BlockMeta {
        BlockMeta {
            id: 0,
            begin_id: 10,
            end_id: 16,
            num_vertices: 6,
            num_edges: 8,
            offset_ratio: 2,
            num_sub_blocks: 2,
            sub_blocks: vec![
                SubBlockMeta {
                    id: 0,
                    begin_id: 10,
                    end_id: 13,
                    num_edges: 5,
                    begin_offset: 0,
                },
                SubBlockMeta {
                    id: 1,
                    begin_id: 13,
                    end_id: 16,
                    num_edges: 3,
                    begin_offset: 5,
                },
            ],
        }
    }

    #[test]
    fn build_derives_offsets_and_sub_ranges() {
        let idx = test_index();
        assert_eq!(idx.num_edges, 8);
        assert_eq!(idx.reduced, vec![0, 2, 6]);
        assert_eq!(idx.subs[0].num_edges, 5);
        assert_eq!(idx.subs[1].num_edges, 3);
        assert_eq!(idx.subs[1].begin_offset, 5);
    }

    #[test]
    fn offset_reconstruction() {
        let idx = test_index();
        assert_eq!(idx.out_offset(10), 0);
        assert_eq!(idx.out_offset(11), 2);
        assert_eq!(idx.out_offset(12), 2);
        assert_eq!(idx.out_offset(13), 5);
        assert_eq!(idx.out_offset(14), 6);
        assert_eq!(idx.out_offset(15), 6);
    }

    #[test]
    fn sub_of_respects_bounds() {
        let idx = test_index();
        assert_eq!(idx.sub_of(10), 0);
        assert_eq!(idx.sub_of(12), 0);
        assert_eq!(idx.sub_of(13), 1);
        assert_eq!(idx.sub_of(15), 1);
    }

    #[test]
    fn encode_decode_round_trip() {
        let idx = test_index();
        let bytes = idx.encode();
        let back = BlockIndex::decode(&test_meta(), &bytes).unwrap();
        assert_eq!(back.reduced, idx.reduced);
        assert_eq!(back.degrees, idx.degrees);
        assert_eq!(back.subs, idx.subs);
        assert_eq!(back.num_edges, 8);
    }

    #[test]
    fn decode_rejects_bad_length() {
        let idx = test_index();
        let mut bytes = idx.encode();
        bytes.pop();
        assert!(BlockIndex::decode(&test_meta(), &bytes).is_err());
    }

    #[test]
    fn walk_reconstructs_sources() {
        let idx = test_index();
        // sub 0 edges: v10 -> a,b ; v12 -> c,d,e
        let edges = vec![100, 101, 102, 103, 104];
        let mut seen = Vec::new();
        walk_sub(&idx, 0, &edges, |u, v, e| seen.push((u, v, e)));
        assert_eq!(
            seen,
            vec![
                (10, 100, 0),
                (10, 101, 1),
                (12, 102, 2),
                (12, 103, 3),
                (12, 104, 4)
            ]
        );
        // sub 1: v13 -> x ; v15 -> y,z
        let edges = vec![200, 201, 202];
        let mut seen = Vec::new();
        walk_sub(&idx, 1, &edges, |u, v, e| seen.push((u, v, e)));
        assert_eq!(seen, vec![(13, 200, 5), (15, 201, 6), (15, 202, 7)]);
    }

    #[test]
    fn out_edges_guard_and_residency() {
        let g = BlockGraph::new(&test_meta());
        g.publish_index(test_index());
        assert!(g.out_edges(10).is_none());
        g.publish_sub(0, vec![100, 101, 102, 103, 104]);
        let e = g.out_edges(12).unwrap();
        assert_eq!(&*e, &[102, 103, 104]);
        assert!(g.out_edges(13).is_none());
        g.release_sub(0);
        assert!(g.out_edges(10).is_none());
    }

    #[test]
    fn compact_sub_applies_deletions() {
        let g = BlockGraph::new(&test_meta());
        g.publish_index(test_index());
        g.publish_sub(0, vec![100, 101, 102, 103, 104]);
        g.reset_deleted();
        g.deleted().set(1); // (10, 101)
        g.deleted().set(2); // (12, 102)
        let (kept, removed) = g.compact_sub(0);
        assert_eq!(kept, vec![100, 103, 104]);
        assert_eq!(removed, vec![1, 0, 1]);
    }
}
