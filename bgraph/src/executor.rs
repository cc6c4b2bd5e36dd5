//! Executor worker: runs the latched map over one block at a time, fanning
//! out to the worker pool.
//!
//! MapVertex chunks the block's vertex range. The edge-driven maps take
//! their tasks from the edge buffer's ready queue, so a task only ever
//! runs over a resident sub-block; each consumed sub-block is finished
//! (released and refunded) as its task completes, which is what keeps the
//! reader streaming ahead under a tight budget.
//!
//! A mutate map compacts every sub-block as it drains: the surviving edges
//! are written out as the `.new` sibling right away (buffering a whole
//! compacted block would break the byte budget), and only the rebuilt
//! index remains for the writeback phase.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, Sender};
use crossbeam::sync::WaitGroup;
use log::{debug, info};

use crate::buffer::EdgeBuffer;
use crate::config::EngineConfig;
use crate::error::fatal;
use crate::graph::{walk_sub, BlockGraph, BlockIndex};
use crate::hub::{ExecuteKind, ExecuteMessage, MapFunc, Message};
use crate::layout;
use crate::pool::{Job, ThreadPool};
use crate::types::*;

pub struct Executor {
    root: PathBuf,
    graphs: Arc<Vec<BlockGraph>>,
    buffer: Arc<EdgeBuffer>,
    pool: ThreadPool,
    parallelism: usize,
    task_package_factor: u32,
    remaining_edges: Arc<AtomicU64>,
    executor_rx: Receiver<ExecuteMessage>,
    response_tx: Sender<Message>,
    /// Per-block deletion counts collected by the last mutate map, consumed
    /// by the Serialize that follows it.
    scratch: HashMap<BlockId, Vec<VertexDegree>>,
    /// Rebuilt indexes awaiting an in-memory republish.
    pending_index: HashMap<BlockId, BlockIndex>,
}

impl Executor {
    pub fn new(
        cfg: &EngineConfig,
        graphs: Arc<Vec<BlockGraph>>,
        buffer: Arc<EdgeBuffer>,
        remaining_edges: Arc<AtomicU64>,
        executor_rx: Receiver<ExecuteMessage>,
        response_tx: Sender<Message>,
    ) -> Self {
        Executor {
            root: cfg.root.clone(),
            graphs,
            buffer,
            pool: ThreadPool::new(cfg.parallelism),
            parallelism: cfg.parallelism,
            task_package_factor: cfg.task_package_factor,
            remaining_edges,
            executor_rx,
            response_tx,
            scratch: HashMap::new(),
            pending_index: HashMap::new(),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name("bg-executor".into())
            .spawn(move || self.run())
            .expect("spawn executor thread")
    }

    fn run(mut self) {
        while let Ok(mut msg) = self.executor_rx.recv() {
            if msg.terminated {
                break;
            }
            debug!("executor: {:?} block {}", msg.kind, msg.block);
            match msg.kind {
                ExecuteKind::Compute => self.run_map(&msg),
                ExecuteKind::Serialize => self.serialize_block(&mut msg),
                ExecuteKind::Deserialize => self.republish_block(&msg),
            }
            self.response_tx
                .send(Message::Execute(msg))
                .expect("response queue closed");
        }
        info!("executor shutting down");
    }

    fn run_map(&mut self, msg: &ExecuteMessage) {
        let map = msg
            .map
            .clone()
            .unwrap_or_else(|| panic!("compute for block {} without a map", msg.block));
        match map {
            MapFunc::Vertex(f) => self.map_vertex_chunks(msg, f),
            MapFunc::VertexWithEdges(f) => {
                self.map_sub_blocks(msg, SubTask::Vertex(f));
            }
            MapFunc::Edge(f) => {
                self.map_sub_blocks(msg, SubTask::Edge(f));
            }
            MapFunc::EdgeMutate(f) => {
                let block = msg.block;
                self.graphs[block as usize].reset_deleted();
                let removed = {
                    let idx = self.graphs[block as usize].index();
                    Arc::new(Mutex::new(vec![0; idx.num_vertices() as usize]))
                };
                self.map_sub_blocks(msg, SubTask::Mutate(f, removed.clone()));
                let removed = Arc::try_unwrap(removed)
                    .expect("mutate tasks still hold the scratch")
                    .into_inner()
                    .unwrap();
                self.scratch.insert(block, removed);
            }
        }
    }

    /// MapVertex: chunk the block's vertex range into at least `task_size`
    /// sized tasks. A streaming block's ready run is drained first; a plain
    /// vertex map has no use for the edge data, and the drain doubles as
    /// the fence that makes a just-reloaded index visible to the chunks.
    fn map_vertex_chunks(&self, msg: &ExecuteMessage, f: Arc<dyn Fn(VertexId) + Send + Sync>) {
        let block = msg.block;
        if !msg.resident {
            let keep = msg.keep_resident;
            self.drain_run(block, |ex, sub| {
                if !keep {
                    ex.graphs[block as usize].release_sub(sub);
                    ex.buffer.finish(block, sub);
                }
            });
        }
        let idx = self.graphs[block as usize].index();
        let n = u64::from(idx.num_vertices());
        let task_num = (self.parallelism as u64 * u64::from(self.task_package_factor)).max(1);
        let task_size = ((n + task_num - 1) / task_num).max(2) as u32;

        let mut jobs: Vec<Job> = Vec::with_capacity((n / u64::from(task_size) + 1) as usize);
        let mut begin = idx.begin_id;
        while begin < idx.end_id {
            let end = idx.end_id.min(begin + task_size);
            let f = f.clone();
            jobs.push(Box::new(move || {
                for v in begin..end {
                    f(v);
                }
            }));
            begin = end;
        }
        self.pool.submit_and_wait(jobs);
    }

    /// The edge-driven maps: one task per sub-block, obtained from the
    /// ready queue (streaming) or from the resident set (in-memory rounds,
    /// short-cut block).
    fn map_sub_blocks(&self, msg: &ExecuteMessage, task: SubTask) {
        let block = msg.block;
        let wg = WaitGroup::new();
        if msg.resident {
            let n = self.graphs[block as usize].num_sub_blocks();
            for sub in 0..n {
                if self.graphs[block as usize].sub_edges(sub).is_some() {
                    self.spawn_sub_task(msg, sub, &task, &wg);
                }
            }
        } else {
            self.drain_run(block, |ex, sub| {
                ex.spawn_sub_task(msg, sub, &task, &wg);
            });
        }
        wg.wait();
    }

    fn spawn_sub_task(&self, msg: &ExecuteMessage, sub: SubBlockId, task: &SubTask, wg: &WaitGroup) {
        let block = msg.block;
        let keep = msg.keep_resident;
        let graphs = self.graphs.clone();
        let buffer = self.buffer.clone();
        let root = self.root.clone();
        let task = task.clone();
        let w = wg.clone();
        self.pool.submit(move || {
            let g = &graphs[block as usize];
            let idx = g.index();
            let edges = g
                .sub_edges(sub)
                .unwrap_or_else(|| panic!("sub-block {sub} of block {block} not resident"));
            match task {
                SubTask::Vertex(f) => {
                    let sr = &idx.subs[sub as usize];
                    for v in sr.begin_id..sr.end_id {
                        f(v);
                    }
                    drop(edges);
                    if !keep {
                        g.release_sub(sub);
                        buffer.finish(block, sub);
                    }
                }
                SubTask::Edge(f) => {
                    walk_sub(&idx, sub, &edges, |u, v, _| f(u, v));
                    drop(edges);
                    if !keep {
                        g.release_sub(sub);
                        buffer.finish(block, sub);
                    }
                }
                SubTask::Mutate(f, removed) => {
                    let bitmap = g.deleted();
                    walk_sub(&idx, sub, &edges, |u, v, e| {
                        if f(u, v) {
                            bitmap.set(e);
                        }
                    });
                    drop(edges);
                    let (kept, sub_removed) = g.compact_sub(sub);
                    {
                        let sr = &idx.subs[sub as usize];
                        let base = (sr.begin_id - idx.begin_id) as usize;
                        let mut rem = removed.lock().unwrap();
                        for (i, r) in sub_removed.into_iter().enumerate() {
                            rem[base + i] += r;
                        }
                    }
                    if keep {
                        let new_size = kept.len() as u64 * EDGE_BYTES;
                        g.publish_sub(sub, kept);
                        buffer.resize_resident(block, sub, new_size);
                    } else {
                        if let Err(e) = layout::write_sub_edges(&root, block, sub, &kept, true) {
                            fatal!("compacted sub-block writeback: {e}");
                        }
                        g.release_sub(sub);
                        buffer.finish(block, sub);
                    }
                }
            }
            drop(w);
        });
    }

    /// Pops the current block's ready run up to its sentinel. A sub-block
    /// id the block does not own means the queue protocol broke down.
    fn drain_run(&self, block: BlockId, mut on_sub: impl FnMut(&Self, SubBlockId)) {
        loop {
            let sub = self.buffer.pop_ready();
            if sub == SUB_BLOCK_SENTINEL {
                return;
            }
            if sub >= self.graphs[block as usize].num_sub_blocks() {
                panic!("ready queue yielded sub-block {sub} while executing block {block}");
            }
            on_sub(self, sub);
        }
    }

    /// Applies the mutate round's deletions: rebuilds degrees, offsets and
    /// sub-block extents. The compacted edge files are already on disk (or
    /// republished in memory); the encoded index rides back to the
    /// scheduler for the writeback.
    fn serialize_block(&mut self, msg: &mut ExecuteMessage) {
        let block = msg.block;
        let removed = self
            .scratch
            .remove(&block)
            .unwrap_or_else(|| panic!("serialize of block {block} without a mutate round"));
        let old = self.graphs[block as usize].index();
        let degrees: Vec<VertexDegree> = old
            .degrees
            .iter()
            .zip(removed.iter())
            .map(|(&d, &r)| d - r)
            .collect();
        let bounds: Vec<_> = old.subs.iter().map(|s| (s.begin_id, s.end_id)).collect();
        let new_idx = BlockIndex::build(
            block,
            old.begin_id,
            old.end_id,
            old.offset_ratio,
            degrees,
            &bounds,
        );
        let deleted = self.graphs[block as usize].deleted().count();
        debug_assert_eq!(deleted, old.num_edges - new_idx.num_edges);
        self.remaining_edges.fetch_sub(deleted, Ordering::Relaxed);
        debug!(
            "block {block} serialized: {deleted} edges deleted, {} remain",
            new_idx.num_edges
        );
        msg.new_block_size = new_idx.index_bytes() + new_idx.num_edges * EDGE_BYTES;
        msg.index_bytes = Some(new_idx.encode());
        self.graphs[block as usize].clear_deleted();
        if msg.keep_resident {
            self.pending_index.insert(block, new_idx);
        }
    }

    /// In-memory republish of a compacted block.
    fn republish_block(&mut self, msg: &ExecuteMessage) {
        let block = msg.block;
        let idx = self
            .pending_index
            .remove(&block)
            .unwrap_or_else(|| panic!("no rebuilt index to publish for block {block}"));
        self.graphs[block as usize].publish_index(idx);
    }
}

#[derive(Clone)]
enum SubTask {
    Vertex(Arc<dyn Fn(VertexId) + Send + Sync>),
    Edge(Arc<dyn Fn(VertexId, VertexId) + Send + Sync>),
    Mutate(
        Arc<dyn Fn(VertexId, VertexId) -> bool + Send + Sync>,
        Arc<Mutex<Vec<VertexDegree>>>,
    ),
}
