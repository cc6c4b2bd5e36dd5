//! Block scheduler: owns all per-block state and drives the computation
//! forward by reacting to worker responses.
//!
//! The per-block lifecycle is
//! `OnDisk → Reading → Serialized → Deserialized → Computed →
//! (Serialized → Writing → OnDisk) | (→ Deserialized)`;
//! the second arm is taken by blocks kept resident (in-memory mode and the
//! short-cut block). A map call arrives as an Execute message on the
//! response queue; the scheduler latches its kernel, marks every block
//! pending, and admits reads smallest-id first against the byte budget (or
//! the pre-read slot count). The caller sleeps on the round gate until the
//! round's last response.
//!
//! Computes are dispatched as soon as their block starts Reading: the
//! executor's edge-driven maps block on the ready queue and consume
//! sub-blocks while the reader streams them, which is what lets a block
//! larger than the edge buffer flow through it.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, Sender};
use log::{debug, info};

use crate::buffer::EdgeBuffer;
use crate::config::EngineConfig;
use crate::graph::BlockGraph;
use crate::hub::{
    ExecuteKind, ExecuteMessage, MapFunc, Message, ReadMessage, WriteMessage,
};
use crate::meta::GraphMeta;
use crate::state::StateSync;
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    OnDisk,
    Reading,
    Serialized,
    Deserialized,
    Computed,
    Writing,
}

/// Rendezvous between the scheduler thread and the caller of a map (or of
/// stop): close, then wait until the scheduler opens it.
pub struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    pub fn new() -> Self {
        Gate {
            open: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    pub fn close(&self) {
        *self.open.lock().unwrap() = false;
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }

    pub fn wait(&self) {
        let mut g = self.open.lock().unwrap();
        while !*g {
            g = self.cv.wait(g).unwrap();
        }
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Scheduler {
    graphs: Arc<Vec<BlockGraph>>,
    buffer: Arc<EdgeBuffer>,
    state_sync: Arc<dyn StateSync>,

    in_memory: bool,
    short_cut: bool,
    use_limits: bool,

    states: Vec<BlockState>,
    pending: Vec<bool>,
    /// Edge data kept resident after compute (in-memory mode, short-cut).
    resident: Vec<bool>,
    /// The next read of the block targets the `.new` siblings.
    mutated_gen: Vec<bool>,
    /// The published index no longer matches the on-disk files; reload on
    /// the next read.
    index_stale: Vec<bool>,
    block_size: Vec<u64>,
    new_sizes: HashMap<BlockId, u64>,

    budget_left: u64,
    limits_left: u32,

    map: Option<MapFunc>,
    executor_running: bool,
    serializes_inflight: usize,
    step: u64,
    stopping: bool,

    map_gate: Arc<Gate>,
    stop_gate: Arc<Gate>,

    reader_tx: Sender<ReadMessage>,
    executor_tx: Sender<ExecuteMessage>,
    writer_tx: Sender<WriteMessage>,
    response_rx: Receiver<Message>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: &EngineConfig,
        meta: &GraphMeta,
        graphs: Arc<Vec<BlockGraph>>,
        buffer: Arc<EdgeBuffer>,
        state_sync: Arc<dyn StateSync>,
        map_gate: Arc<Gate>,
        stop_gate: Arc<Gate>,
        reader_tx: Sender<ReadMessage>,
        executor_tx: Sender<ExecuteMessage>,
        writer_tx: Sender<WriteMessage>,
        response_rx: Receiver<Message>,
    ) -> Self {
        let n = meta.num_blocks as usize;
        Scheduler {
            graphs,
            buffer,
            state_sync,
            in_memory: cfg.in_memory,
            short_cut: cfg.short_cut,
            use_limits: cfg.use_limits(),
            states: vec![BlockState::OnDisk; n],
            pending: vec![false; n],
            resident: vec![false; n],
            mutated_gen: vec![false; n],
            index_stale: vec![false; n],
            block_size: meta.blocks.iter().map(|b| b.size_bytes()).collect(),
            new_sizes: HashMap::new(),
            budget_left: cfg.memory_budget,
            limits_left: cfg.limits,
            map: None,
            executor_running: false,
            serializes_inflight: 0,
            step: 0,
            stopping: false,
            map_gate,
            stop_gate,
            reader_tx,
            executor_tx,
            writer_tx,
            response_rx,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name("bg-scheduler".into())
            .spawn(move || self.run())
            .expect("spawn scheduler thread")
    }

    fn run(mut self) {
        info!("scheduler starts over {} blocks", self.states.len());
        loop {
            let msg = self.response_rx.recv().expect("response queue closed");
            if msg.is_terminated() {
                self.stopping = true;
            } else {
                match msg {
                    Message::Read(m) => self.on_read_response(m),
                    Message::Execute(m) => self.on_execute_response(m),
                    Message::Write(m) => self.on_write_response(m),
                }
            }
            if self.stopping && self.try_shutdown() {
                break;
            }
        }
        info!("scheduler stops after {} supersteps", self.step);
    }

    // ---- response handlers ----

    fn on_read_response(&mut self, m: ReadMessage) {
        let b = m.block as usize;
        debug!("read response for block {} ({} bytes)", m.block, m.bytes_read);
        // The executor may already have streamed and computed the block.
        if self.states[b] == BlockState::Reading {
            self.states[b] = BlockState::Deserialized;
        }
        if self.stopping {
            return;
        }
        if !self.executor_running {
            self.dispatch_next_compute();
        }
        self.try_read_next();
    }

    fn on_execute_response(&mut self, mut m: ExecuteMessage) {
        // A map call entering through the response queue: latch the kernel
        // and start the round.
        if m.block == INVALID_BLOCK_ID && m.map.is_some() {
            let map = m.map.take().unwrap();
            debug!("superstep {}: {}", self.step, map.kind_name());
            if self.map.replace(map).is_some() {
                panic!("a map call arrived while another is in flight");
            }
            self.start_round();
            return;
        }

        match m.kind {
            ExecuteKind::Compute => {
                self.executor_running = false;
                let b = m.block as usize;
                self.pending[b] = false;
                self.states[b] = BlockState::Computed;
                let mutate = self.map.as_ref().is_some_and(MapFunc::is_mutate);
                if mutate {
                    let mut sm = ExecuteMessage::new(m.block, ExecuteKind::Serialize);
                    sm.keep_resident = m.keep_resident;
                    self.serializes_inflight += 1;
                    self.executor_running = true;
                    self.executor_tx.send(sm).expect("executor queue closed");
                    return;
                }
                if m.keep_resident {
                    self.resident[b] = true;
                    self.states[b] = BlockState::Deserialized;
                } else if !self.in_memory {
                    self.send_write(m.block, false, None);
                }
                self.after_block_event();
            }
            ExecuteKind::Serialize => {
                self.executor_running = false;
                self.serializes_inflight -= 1;
                let b = m.block as usize;
                self.states[b] = BlockState::Serialized;
                self.mutated_gen[b] = true;
                self.new_sizes.insert(m.block, m.new_block_size);
                if m.keep_resident {
                    self.executor_running = true;
                    let mut dm = ExecuteMessage::new(m.block, ExecuteKind::Deserialize);
                    dm.keep_resident = true;
                    self.executor_tx.send(dm).expect("executor queue closed");
                } else {
                    self.index_stale[b] = true;
                    self.send_write(m.block, true, m.index_bytes.take());
                    self.after_block_event();
                }
            }
            ExecuteKind::Deserialize => {
                self.executor_running = false;
                let b = m.block as usize;
                self.states[b] = BlockState::Deserialized;
                self.resident[b] = true;
                // an in-memory compaction shrank the block
                if let Some(new) = self.new_sizes.remove(&m.block) {
                    if !self.use_limits {
                        self.budget_left += self.block_size[b] - new;
                    }
                    self.block_size[b] = new;
                }
                self.after_block_event();
            }
        }
    }

    fn on_write_response(&mut self, m: WriteMessage) {
        let b = m.block as usize;
        self.states[b] = BlockState::OnDisk;
        if self.use_limits {
            self.limits_left += 1;
        } else {
            self.budget_left += self.block_size[b];
        }
        if let Some(new) = self.new_sizes.remove(&m.block) {
            self.block_size[b] = new;
        }
        debug!(
            "write response for block {}; budget left {} bytes",
            m.block, self.budget_left
        );
        if !self.stopping && self.map.is_some() {
            self.try_read_next();
            if !self.executor_running {
                self.dispatch_next_compute();
            }
        }
    }

    // ---- round bookkeeping ----

    fn start_round(&mut self) {
        for p in &mut self.pending {
            *p = true;
        }
        while self.try_read_next() {}
        if !self.executor_running {
            self.dispatch_next_compute();
        }
    }

    /// Runs after a block finished its round trip; closes the round once
    /// nothing is pending and the executor has drained.
    fn after_block_event(&mut self) {
        if self.round_finished() {
            self.finish_round();
            return;
        }
        if !self.executor_running {
            self.dispatch_next_compute();
        }
        self.try_read_next();
    }

    fn round_finished(&self) -> bool {
        self.map.is_some()
            && !self.executor_running
            && self.serializes_inflight == 0
            && self.pending.iter().all(|p| !p)
    }

    fn finish_round(&mut self) {
        self.state_sync.sync();
        self.map = None;
        self.step += 1;
        debug!("superstep {} complete", self.step);
        self.map_gate.open();
    }

    /// Admission: the smallest-id block still pending for this round that
    /// sits OnDisk, iff the byte budget (or a pre-read slot) covers it.
    fn try_read_next(&mut self) -> bool {
        if self.map.is_none() {
            return false;
        }
        let Some(b) = (0..self.states.len()).find(|&b| {
            self.pending[b] && self.states[b] == BlockState::OnDisk && !self.resident[b]
        }) else {
            return false;
        };
        if self.use_limits {
            if self.limits_left == 0 {
                return false;
            }
            self.limits_left -= 1;
        } else {
            if self.budget_left < self.block_size[b] {
                return false;
            }
            self.budget_left -= self.block_size[b];
        }
        self.states[b] = BlockState::Reading;
        let msg = ReadMessage {
            block: b as BlockId,
            mutated: self.mutated_gen[b],
            reload_index: self.index_stale[b],
            ..Default::default()
        };
        self.index_stale[b] = false;
        debug!("admitting block {b}; budget left {} bytes", self.budget_left);
        self.reader_tx.send(msg).expect("reader queue closed");
        true
    }

    /// Next block to execute: a kept-resident one first (the short-cut
    /// block runs before anything is read), otherwise the smallest pending
    /// block that is Deserialized or currently streaming in.
    fn dispatch_next_compute(&mut self) {
        if self.map.is_none() {
            return;
        }
        let resident = (0..self.states.len())
            .find(|&b| self.pending[b] && self.resident[b] && self.states[b] == BlockState::Deserialized);
        let streaming = || {
            (0..self.states.len()).find(|&b| {
                self.pending[b]
                    && matches!(self.states[b], BlockState::Reading | BlockState::Deserialized)
            })
        };
        let Some(b) = resident.or_else(streaming) else {
            return;
        };
        let map = self.map.clone().unwrap();
        let keep = self.in_memory
            || (self.short_cut && !map.is_mutate() && self.is_last_pending(b));
        let mut m = ExecuteMessage::new(b as BlockId, ExecuteKind::Compute);
        m.map = Some(map);
        m.resident = self.resident[b];
        m.keep_resident = keep;
        self.executor_running = true;
        debug!("dispatching compute for block {b} (resident: {})", m.resident);
        self.executor_tx.send(m).expect("executor queue closed");
    }

    fn is_last_pending(&self, b: usize) -> bool {
        self.pending
            .iter()
            .enumerate()
            .all(|(i, &p)| !p || i == b)
    }

    fn send_write(&mut self, block: BlockId, mutated: bool, index_bytes: Option<Vec<u8>>) {
        self.states[block as usize] = BlockState::Writing;
        let msg = WriteMessage {
            block,
            mutated,
            index_bytes,
            ..Default::default()
        };
        self.writer_tx.send(msg).expect("writer queue closed");
    }

    // ---- termination ----

    /// Once a terminate request has been seen: release whatever is kept
    /// resident; when every block is OnDisk and nothing is in flight,
    /// push the sentinels, wake the stopper and exit.
    fn try_shutdown(&mut self) -> bool {
        for b in 0..self.states.len() {
            if self.resident[b] && self.states[b] == BlockState::Deserialized {
                self.graphs[b].release_all_subs();
                self.buffer.release_all(b as BlockId);
                if self.use_limits {
                    self.limits_left += 1;
                } else {
                    self.budget_left += self.block_size[b];
                }
                self.resident[b] = false;
                // the on-disk files remain the source of truth; in-memory
                // mutations are discarded by contract
                self.states[b] = BlockState::OnDisk;
            }
        }
        let quiescent = self.map.is_none()
            && !self.executor_running
            && self.serializes_inflight == 0
            && self.states.iter().all(|&s| s == BlockState::OnDisk);
        if !quiescent {
            return false;
        }
        self.reader_tx
            .send(ReadMessage {
                terminated: true,
                ..Default::default()
            })
            .expect("reader queue closed");
        self.executor_tx
            .send(ExecuteMessage::terminate())
            .expect("executor queue closed");
        self.writer_tx
            .send(WriteMessage {
                terminated: true,
                ..Default::default()
            })
            .expect("writer queue closed");
        self.stop_gate.open();
        true
    }
}
