//! Engine facade: loads the metadata and index arrays, spawns the four
//! workers, and exposes the map primitives as synchronous calls.
//!
//! A kernel is an ordinary closure over vertex ids; it captures whatever
//! shared handles it needs (the vertex state, a [`GraphView`]) and the map
//! call returns once the superstep has been executed over every block and
//! the vertex state synced.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam::channel::Sender;
use log::info;

use crate::buffer::EdgeBuffer;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::graph::{BlockGraph, EdgeSlice};
use crate::hub::{ExecuteKind, ExecuteMessage, MapFunc, Message, MessageHub};
use crate::layout;
use crate::meta::GraphMeta;
use crate::reader::Reader;
use crate::scheduler::{Gate, Scheduler};
use crate::state::{StateSync, VertexState, VertexValue};
use crate::types::*;
use crate::writer::Writer;

/// Shared read view over the whole graph's index structures; cheap to
/// clone into kernels. Edge access crosses into a block's resident
/// sub-blocks and returns `None` otherwise.
#[derive(Clone)]
pub struct GraphView {
    meta: Arc<GraphMeta>,
    graphs: Arc<Vec<BlockGraph>>,
}

impl GraphView {
    pub fn num_vertices(&self) -> VertexCount {
        self.meta.num_vertices
    }

    pub fn out_degree(&self, v: VertexId) -> VertexDegree {
        let b = self.meta.block_of(v);
        self.graphs[b as usize].out_degree(v)
    }

    pub fn out_edges(&self, v: VertexId) -> Option<EdgeSlice> {
        let b = self.meta.block_of(v);
        self.graphs[b as usize].out_edges(v)
    }
}

pub struct BlockEngine<T: VertexValue> {
    meta: Arc<GraphMeta>,
    graphs: Arc<Vec<BlockGraph>>,
    buffer: Arc<EdgeBuffer>,
    state: Arc<VertexState<T>>,
    remaining_edges: Arc<AtomicU64>,
    response_tx: Sender<Message>,
    map_gate: Arc<Gate>,
    stop_gate: Arc<Gate>,
    // one map call at a time; the scheduler latches a single kernel
    map_lock: Mutex<()>,
    handles: Vec<JoinHandle<()>>,
    stopped: bool,
}

impl<T: VertexValue> BlockEngine<T> {
    pub fn open(cfg: EngineConfig) -> Result<Self> {
        let mut cfg = cfg;
        cfg.parallelism = cfg.parallelism.max(1);
        let meta = Arc::new(GraphMeta::load(&cfg.root)?);

        let largest_sub = meta.max_sub_block_bytes();
        if cfg.edge_buffer_budget < largest_sub {
            return Err(Error::BudgetTooSmall {
                budget: cfg.edge_buffer_budget,
                largest: largest_sub,
            });
        }
        let largest_block = meta.blocks.iter().map(|b| b.size_bytes()).max().unwrap_or(0);
        if !cfg.use_limits() && cfg.memory_budget < largest_block {
            return Err(Error::MemoryBudgetTooSmall {
                budget: cfg.memory_budget,
                largest: largest_block,
            });
        }
        if cfg.in_memory {
            let total: u64 = meta.blocks.iter().map(|b| b.size_bytes()).sum();
            let total_edges = meta.num_edges * EDGE_BYTES;
            if (!cfg.use_limits() && cfg.memory_budget < total) || cfg.edge_buffer_budget < total_edges
            {
                return Err(Error::MemoryBudgetTooSmall {
                    budget: cfg.memory_budget.min(cfg.edge_buffer_budget),
                    largest: total,
                });
            }
        }

        // Index arrays are small and stay resident for every block.
        let graphs: Arc<Vec<BlockGraph>> = Arc::new(
            meta.blocks
                .iter()
                .map(|bm| {
                    let g = BlockGraph::new(bm);
                    layout::read_index(&cfg.root, bm, false).map(|idx| {
                        g.publish_index(idx);
                        g
                    })
                })
                .collect::<Result<_>>()?,
        );

        let state = Arc::new(VertexState::<T>::new(
            meta.num_vertices as usize,
            cfg.read_only_sync,
        ));
        let buffer = Arc::new(EdgeBuffer::new(&meta, cfg.edge_buffer_budget));
        let remaining_edges = Arc::new(AtomicU64::new(meta.num_edges));
        let map_gate = Arc::new(Gate::new());
        let stop_gate = Arc::new(Gate::new());
        let hub = MessageHub::new();

        let reader = Reader::new(
            &cfg,
            meta.clone(),
            graphs.clone(),
            buffer.clone(),
            hub.reader_rx.clone(),
            hub.response_tx.clone(),
        );
        let writer = Writer::new(
            cfg.root.clone(),
            hub.writer_rx.clone(),
            hub.response_tx.clone(),
        );
        let executor = Executor::new(
            &cfg,
            graphs.clone(),
            buffer.clone(),
            remaining_edges.clone(),
            hub.executor_rx.clone(),
            hub.response_tx.clone(),
        );
        let scheduler = Scheduler::new(
            &cfg,
            &meta,
            graphs.clone(),
            buffer.clone(),
            state.clone() as Arc<dyn StateSync>,
            map_gate.clone(),
            stop_gate.clone(),
            hub.reader_tx.clone(),
            hub.executor_tx.clone(),
            hub.writer_tx.clone(),
            hub.response_rx.clone(),
        );

        let handles = vec![
            reader.spawn(),
            writer.spawn(),
            executor.spawn(),
            scheduler.spawn(),
        ];
        info!(
            "engine open: {} vertices, {} edges, {} blocks, parallelism {}",
            meta.num_vertices, meta.num_edges, meta.num_blocks, cfg.parallelism
        );

        Ok(BlockEngine {
            meta,
            graphs,
            buffer,
            state,
            remaining_edges,
            response_tx: hub.response_tx.clone(),
            map_gate,
            stop_gate,
            map_lock: Mutex::new(()),
            handles,
            stopped: false,
        })
    }

    pub fn state(&self) -> Arc<VertexState<T>> {
        self.state.clone()
    }

    pub fn view(&self) -> GraphView {
        GraphView {
            meta: self.meta.clone(),
            graphs: self.graphs.clone(),
        }
    }

    pub fn num_vertices(&self) -> VertexCount {
        self.meta.num_vertices
    }

    pub fn num_edges(&self) -> u64 {
        self.meta.num_edges
    }

    /// Edges still present after the mutate rounds so far.
    pub fn remaining_edges(&self) -> u64 {
        self.remaining_edges.load(Ordering::Relaxed)
    }

    /// High-water mark of resident edge-buffer bytes.
    pub fn peak_resident_bytes(&self) -> u64 {
        self.buffer.peak_bytes()
    }

    /// For each vertex of the current block, calls `f(v)`. `f` may read any
    /// vertex's synced value and write any vertex through the combining
    /// writers; it must not assume edge access.
    pub fn map_vertex(&self, f: impl Fn(VertexId) + Send + Sync + 'static) {
        self.run_map(MapFunc::Vertex(Arc::new(f)));
    }

    /// Like [`map_vertex`](Self::map_vertex), but dispatched per resident
    /// sub-block: `f(v)` may use `out_edges(v)`.
    pub fn map_vertex_with_edges(&self, f: impl Fn(VertexId) + Send + Sync + 'static) {
        self.run_map(MapFunc::VertexWithEdges(Arc::new(f)));
    }

    /// For each edge `(u, v)` with `u` in the current block, calls
    /// `f(u, v)` exactly once.
    pub fn map_edge(&self, f: impl Fn(VertexId, VertexId) + Send + Sync + 'static) {
        self.run_map(MapFunc::Edge(Arc::new(f)));
    }

    /// Like [`map_edge`](Self::map_edge); returning `true` deletes the
    /// edge. Deletions are applied when the round ends: blocks are
    /// compacted and rewritten as `.new` siblings (or republished in
    /// memory under `in_memory`).
    pub fn map_edge_and_mutate(
        &self,
        f: impl Fn(VertexId, VertexId) -> bool + Send + Sync + 'static,
    ) {
        self.run_map(MapFunc::EdgeMutate(Arc::new(f)));
    }

    fn run_map(&self, map: MapFunc) {
        let _serial = self.map_lock.lock().unwrap();
        self.map_gate.close();
        let mut m = ExecuteMessage::new(INVALID_BLOCK_ID, ExecuteKind::Compute);
        m.map = Some(map);
        self.response_tx
            .send(Message::Execute(m))
            .expect("response queue closed");
        self.map_gate.wait();
    }

    /// Waits for outstanding writebacks, shuts the workers down and joins
    /// them.
    pub fn stop(mut self) -> Result<()> {
        self.stop_inner();
        Ok(())
    }

    fn stop_inner(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.stop_gate.close();
        self.response_tx
            .send(Message::Execute(ExecuteMessage::terminate()))
            .expect("response queue closed");
        self.stop_gate.wait();
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
        info!("engine stopped");
    }
}

impl<T: VertexValue> Drop for BlockEngine<T> {
    fn drop(&mut self) {
        self.stop_inner();
    }
}
