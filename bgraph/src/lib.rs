//! Out-of-core vertex-centric graph engine.
//!
//! Graphs are pre-partitioned on disk into blocks (contiguous vertex
//! ranges) and sub-blocks (contiguous edge ranges); the engine streams
//! sub-blocks from disk through a byte-budgeted edge buffer while a worker
//! pool runs user kernels over whatever is resident. Kernels enter through
//! the map primitives on [`engine::BlockEngine`] and talk to the world
//! through [`state::VertexState`] and [`engine::GraphView`].

pub mod bitmap;
pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod graph;
pub mod hub;
pub mod layout;
pub mod meta;
pub mod pool;
pub mod reader;
pub mod scheduler;
pub mod state;
pub mod types;
pub mod writer;

pub use config::{parse_size, EngineConfig, ReadMode};
pub use engine::{BlockEngine, GraphView};
pub use error::{Error, Result};
pub use state::{VertexState, VertexValue};
pub use types::{BlockId, EdgeIndex, SubBlockId, VertexCount, VertexDegree, VertexId};
