//! Typed message queues between the scheduler and its workers.
//!
//! The scheduler owns all state and only ever reacts to the response
//! queue; the reader, executor and writer own nothing and only produce
//! responses. A message whose `terminated` flag is set shuts its consumer
//! down.

use std::sync::Arc;

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::types::{BlockId, VertexId};

/// The kernel latched for the current map call, type-erased so messages do
/// not depend on the vertex-data type. One virtual call per edge/vertex;
/// the kernels themselves capture their typed state.
#[derive(Clone)]
pub enum MapFunc {
    /// Chunked over the block's vertex range.
    Vertex(Arc<dyn Fn(VertexId) + Send + Sync>),
    /// Per resident sub-block; `f(v)` may use `out_edges(v)`.
    VertexWithEdges(Arc<dyn Fn(VertexId) + Send + Sync>),
    Edge(Arc<dyn Fn(VertexId, VertexId) + Send + Sync>),
    /// Returning `true` deletes the edge.
    EdgeMutate(Arc<dyn Fn(VertexId, VertexId) -> bool + Send + Sync>),
}

impl MapFunc {
    pub fn kind_name(&self) -> &'static str {
        match self {
            MapFunc::Vertex(_) => "MapVertex",
            MapFunc::VertexWithEdges(_) => "MapVertexWithEdges",
            MapFunc::Edge(_) => "MapEdge",
            MapFunc::EdgeMutate(_) => "MapEdgeAndMutate",
        }
    }

    pub fn is_mutate(&self) -> bool {
        matches!(self, MapFunc::EdgeMutate(_))
    }
}

impl std::fmt::Debug for MapFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind_name())
    }
}

#[derive(Debug, Default)]
pub struct ReadMessage {
    pub block: BlockId,
    /// Read the `.new` siblings (the block's mutation generation advanced).
    pub mutated: bool,
    /// Re-read and republish `index.bin` before streaming edges.
    pub reload_index: bool,
    // response fields
    pub bytes_read: u64,
    pub terminated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteKind {
    /// Publish a rebuilt in-memory index (post-compaction republish).
    Deserialize,
    /// Run the latched map over one block.
    Compute,
    /// Apply the deletion bitmap: compact the block and hand the new index
    /// back for writeback.
    Serialize,
}

#[derive(Debug)]
pub struct ExecuteMessage {
    pub block: BlockId,
    pub kind: ExecuteKind,
    pub map: Option<MapFunc>,
    /// The block's edge data is fully resident; do not consume a ready-queue
    /// run for it.
    pub resident: bool,
    /// Keep the block's edge data resident after the map (in-memory mode,
    /// short-cut block).
    pub keep_resident: bool,
    // response fields
    /// Encoded `index.bin` contents produced by a Serialize.
    pub index_bytes: Option<Vec<u8>>,
    /// Block size in bytes after a Serialize (new index + kept edges).
    pub new_block_size: u64,
    pub terminated: bool,
}

impl ExecuteMessage {
    pub fn new(block: BlockId, kind: ExecuteKind) -> Self {
        ExecuteMessage {
            block,
            kind,
            map: None,
            resident: false,
            keep_resident: false,
            index_bytes: None,
            new_block_size: 0,
            terminated: false,
        }
    }

    pub fn terminate() -> Self {
        ExecuteMessage {
            terminated: true,
            ..ExecuteMessage::new(crate::types::INVALID_BLOCK_ID, ExecuteKind::Compute)
        }
    }
}

#[derive(Debug, Default)]
pub struct WriteMessage {
    pub block: BlockId,
    /// The block was mutated this round; write the `.new` index. Clean
    /// blocks need no disk traffic, their edge data never changed.
    pub mutated: bool,
    pub index_bytes: Option<Vec<u8>>,
    // response fields
    pub bytes_written: u64,
    pub terminated: bool,
}

#[derive(Debug)]
pub enum Message {
    Read(ReadMessage),
    Execute(ExecuteMessage),
    Write(WriteMessage),
}

impl Message {
    pub fn is_terminated(&self) -> bool {
        match self {
            Message::Read(m) => m.terminated,
            Message::Execute(m) => m.terminated,
            Message::Write(m) => m.terminated,
        }
    }
}

/// The four queues. Push never blocks; pop suspends on an empty queue.
pub struct MessageHub {
    pub reader_tx: Sender<ReadMessage>,
    pub reader_rx: Receiver<ReadMessage>,
    pub executor_tx: Sender<ExecuteMessage>,
    pub executor_rx: Receiver<ExecuteMessage>,
    pub writer_tx: Sender<WriteMessage>,
    pub writer_rx: Receiver<WriteMessage>,
    pub response_tx: Sender<Message>,
    pub response_rx: Receiver<Message>,
}

impl MessageHub {
    pub fn new() -> Self {
        let (reader_tx, reader_rx) = unbounded();
        let (executor_tx, executor_rx) = unbounded();
        let (writer_tx, writer_rx) = unbounded();
        let (response_tx, response_rx) = unbounded();
        MessageHub {
            reader_tx,
            reader_rx,
            executor_tx,
            executor_rx,
            writer_tx,
            writer_rx,
            response_tx,
            response_rx,
        }
    }
}

impl Default for MessageHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminated_flag_reaches_the_union() {
        let m = Message::Read(ReadMessage {
            terminated: true,
            ..Default::default()
        });
        assert!(m.is_terminated());
        let m = Message::Execute(ExecuteMessage::new(3, ExecuteKind::Compute));
        assert!(!m.is_terminated());
        let m = Message::Execute(ExecuteMessage::terminate());
        assert!(m.is_terminated());
    }

    #[test]
    fn queues_are_fifo() {
        let hub = MessageHub::new();
        for b in 0..3 {
            hub.reader_tx
                .send(ReadMessage {
                    block: b,
                    ..Default::default()
                })
                .unwrap();
        }
        for b in 0..3 {
            assert_eq!(hub.reader_rx.recv().unwrap().block, b);
        }
    }
}
