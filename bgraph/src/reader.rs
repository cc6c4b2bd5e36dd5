//! Async sub-block reader: one thread, one io_uring, at most `queue_depth`
//! reads in flight.
//!
//! For each ReadMessage the reader streams the block's scheduled
//! sub-blocks: admit against the edge buffer, submit, and publish each
//! completed array into the BlockGraph before signalling it on the ready
//! queue. Short reads are resubmitted at the advanced offset; a negative
//! completion is fatal. After the last completion it pushes the ready-queue
//! sentinel and responds to the scheduler.

use std::collections::HashMap;
use std::fs::{self, File};
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, Sender};
use io_uring::{opcode, squeue, types, IoUring};
use log::{debug, info};
use rand::seq::SliceRandom;

use crate::buffer::EdgeBuffer;
use crate::config::{EngineConfig, ReadMode};
use crate::error::fatal;
use crate::graph::{BlockGraph, BlockIndex};
use crate::hub::{Message, ReadMessage};
use crate::meta::{self, GraphMeta};
use crate::types::*;

struct InFlight {
    sub: SubBlockId,
    // must stay open until the final completion
    file: File,
    buf: Vec<VertexId>,
    want: u64,
    done: u64,
}

pub struct Reader {
    root: PathBuf,
    meta: Arc<GraphMeta>,
    graphs: Arc<Vec<BlockGraph>>,
    buffer: Arc<EdgeBuffer>,
    mode: ReadMode,
    static_schedule: HashMap<BlockId, Vec<SubBlockId>>,
    queue_depth: u32,
    reader_rx: Receiver<ReadMessage>,
    response_tx: Sender<Message>,
}

impl Reader {
    pub fn new(
        cfg: &EngineConfig,
        meta: Arc<GraphMeta>,
        graphs: Arc<Vec<BlockGraph>>,
        buffer: Arc<EdgeBuffer>,
        reader_rx: Receiver<ReadMessage>,
        response_tx: Sender<Message>,
    ) -> Self {
        Reader {
            root: cfg.root.clone(),
            meta,
            graphs,
            buffer,
            mode: cfg.mode,
            static_schedule: cfg.static_schedule.clone(),
            queue_depth: cfg.queue_depth,
            reader_rx,
            response_tx,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name("bg-reader".into())
            .spawn(move || self.run())
            .expect("spawn reader thread")
    }

    fn run(self) {
        let mut ring = match IoUring::new(self.queue_depth) {
            Ok(r) => r,
            Err(e) => fatal!("io_uring queue init: {e}"),
        };
        let mut total_read = 0u64;
        while let Ok(mut msg) = self.reader_rx.recv() {
            if msg.terminated {
                break;
            }
            let block = msg.block;
            debug!("reader starts block {block}");
            msg.bytes_read = self.stream_block(&mut ring, &msg);
            total_read += msg.bytes_read;
            debug!("reader completes block {block} ({} bytes)", msg.bytes_read);
            self.response_tx
                .send(Message::Read(msg))
                .expect("response queue closed");
        }
        info!("reader read {total_read} bytes in total, shutting down");
    }

    fn schedule(&self, block: BlockId) -> Vec<SubBlockId> {
        let n = self.graphs[block as usize].num_sub_blocks();
        match self.mode {
            ReadMode::Normal => (0..n).collect(),
            ReadMode::Random => {
                let mut order: Vec<_> = (0..n).collect();
                order.shuffle(&mut rand::thread_rng());
                order
            }
            ReadMode::Static => self
                .static_schedule
                .get(&block)
                .cloned()
                .unwrap_or_else(|| (0..n).collect()),
        }
    }

    fn stream_block(&self, ring: &mut IoUring, msg: &ReadMessage) -> u64 {
        let block = msg.block;
        let graph = &self.graphs[block as usize];

        if msg.reload_index {
            let path = meta::index_path(&self.root, block, msg.mutated);
            let bytes = match fs::read(&path) {
                Ok(b) => b,
                Err(e) => fatal!("open {} failed: {e}", path.display()),
            };
            match BlockIndex::decode(&self.meta.blocks[block as usize], &bytes) {
                Ok(idx) => graph.publish_index(idx),
                Err(e) => fatal!("block {block}: {e}"),
            }
        }

        let order = self.schedule(block);
        self.buffer.activate(block, &order);

        let qd = self.queue_depth as usize;
        let mut slab: Vec<Option<InFlight>> = (0..qd).map(|_| None).collect();
        let mut next = 0usize;
        let mut outstanding = 0usize;
        let mut completed = 0usize;
        let mut bytes_read = 0u64;

        while completed < order.len() {
            while outstanding < qd && next < order.len() {
                let sub = order[next];
                let path = meta::sub_block_path(&self.root, block, sub, msg.mutated);
                let file = match File::open(&path) {
                    Ok(f) => f,
                    Err(e) => fatal!("open {} failed: {e}", path.display()),
                };
                let want = match file.metadata() {
                    Ok(m) => m.len(),
                    Err(e) => fatal!("stat {} failed: {e}", path.display()),
                };
                if want % EDGE_BYTES != 0 {
                    fatal!("{}: size {want} is not a whole number of edges", path.display());
                }
                if want == 0 {
                    self.buffer.apply(block, sub, 0);
                    graph.publish_sub(sub, Vec::new());
                    self.buffer.push_loaded(block, sub);
                    next += 1;
                    completed += 1;
                    continue;
                }
                // With reads in flight, admission must not block: the next
                // completion may free budget. With nothing in flight it
                // must, and the executor's finish calls will wake it.
                if outstanding == 0 {
                    self.buffer.apply(block, sub, want);
                } else if !self.buffer.try_apply(block, sub, want) {
                    break;
                }
                let slot = slab
                    .iter()
                    .position(Option::is_none)
                    .expect("in-flight slab full");
                slab[slot] = Some(InFlight {
                    sub,
                    file,
                    buf: vec![0; (want / EDGE_BYTES) as usize],
                    want,
                    done: 0,
                });
                submit_read(ring, slot, slab[slot].as_mut().unwrap());
                outstanding += 1;
                next += 1;
            }

            if outstanding == 0 {
                continue;
            }
            if let Err(e) = ring.submit_and_wait(1) {
                fatal!("io_uring submit_and_wait: {e}");
            }
            let cqes: Vec<_> = ring.completion().collect();
            for cqe in cqes {
                let slot = cqe.user_data() as usize;
                let res = cqe.result();
                let fl = slab[slot].as_mut().expect("completion for empty slot");
                if res < 0 {
                    fatal!(
                        "read of block {block} sub-block {} failed: errno {}",
                        fl.sub,
                        -res
                    );
                }
                if res == 0 {
                    fatal!(
                        "short read of block {block} sub-block {}: {} of {} bytes",
                        fl.sub,
                        fl.done,
                        fl.want
                    );
                }
                fl.done += res as u64;
                if fl.done < fl.want {
                    // partial read: resubmit the remainder at the advanced
                    // offset
                    submit_read(ring, slot, fl);
                    continue;
                }
                let fl = slab[slot].take().expect("double completion");
                bytes_read += fl.want;
                graph.publish_sub(fl.sub, fl.buf);
                self.buffer.push_loaded(block, fl.sub);
                outstanding -= 1;
                completed += 1;
            }
        }

        self.buffer.push_sentinel();
        bytes_read
    }
}

fn submit_read(ring: &mut IoUring, slot: usize, fl: &mut InFlight) {
    // Safety: the buffer lives in the slab until the final completion for
    // this slot is reaped.
    let ptr = unsafe { fl.buf.as_mut_ptr().cast::<u8>().add(fl.done as usize) };
    let len = (fl.want - fl.done) as u32;
    let entry = opcode::Read::new(types::Fd(fl.file.as_raw_fd()), ptr, len)
        .offset(fl.done)
        .build()
        .user_data(slot as u64);
    push_entry(ring, &entry);
}

// A full submission queue is transient: flush it and retry.
fn push_entry(ring: &mut IoUring, entry: &squeue::Entry) {
    loop {
        let pushed = unsafe { ring.submission().push(entry).is_ok() };
        if pushed {
            return;
        }
        if let Err(e) = ring.submit() {
            fatal!("io_uring submit: {e}");
        }
    }
}
