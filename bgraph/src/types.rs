//! Core identifier and offset types shared across the engine.

/// Global vertex identifier.
pub type VertexId = u32;
/// Number of vertices.
pub type VertexCount = u32;
/// Out-degree of a single vertex.
pub type VertexDegree = u32;
/// Index into the (conceptually) global edge array, and edge offsets.
pub type EdgeIndex = u64;
/// Identifier of a block (a contiguous vertex range plus its out-edges).
pub type BlockId = u32;
/// Identifier of a sub-block within a block.
pub type SubBlockId = u32;

/// Placeholder block id used by control messages that do not name a block.
pub const INVALID_BLOCK_ID: BlockId = BlockId::MAX;

/// Ready-queue sentinel: all of the current block's reads have been issued
/// and completed, drain whatever residents remain.
pub const SUB_BLOCK_SENTINEL: SubBlockId = 0xFFFF_FFFF;

/// Bytes per stored edge (one destination vertex id).
pub const EDGE_BYTES: u64 = std::mem::size_of::<VertexId>() as u64;

/// Bytes per stored vertex degree in `index.bin`.
pub const DEGREE_BYTES: u64 = std::mem::size_of::<VertexDegree>() as u64;

/// Bytes per stored reduced offset in `index.bin`.
pub const OFFSET_BYTES: u64 = std::mem::size_of::<EdgeIndex>() as u64;
