//! Writer worker: persists mutated blocks as their `.new` siblings.
//!
//! The compacted sub-block files are written by the mutate map's tasks as
//! each sub-block drains (holding a whole compacted block in memory would
//! break the edge-buffer budget); what remains at writeback time is the
//! rebuilt index. Clean blocks cost no disk traffic, their edge data never
//! changed. A write failure is fatal, as is every I/O error in this engine.

use std::path::PathBuf;
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, Sender};
use log::{debug, info};

use crate::error::fatal;
use crate::hub::{Message, WriteMessage};
use crate::layout;

pub struct Writer {
    root: PathBuf,
    writer_rx: Receiver<WriteMessage>,
    response_tx: Sender<Message>,
}

impl Writer {
    pub fn new(
        root: PathBuf,
        writer_rx: Receiver<WriteMessage>,
        response_tx: Sender<Message>,
    ) -> Self {
        Writer {
            root,
            writer_rx,
            response_tx,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name("bg-writer".into())
            .spawn(move || self.run())
            .expect("spawn writer thread")
    }

    fn run(self) {
        let mut total_written = 0u64;
        while let Ok(mut msg) = self.writer_rx.recv() {
            if msg.terminated {
                break;
            }
            if msg.mutated {
                let bytes = msg.index_bytes.take().unwrap_or_default();
                match layout::write_index_bytes(&self.root, msg.block, &bytes, true) {
                    Ok(n) => msg.bytes_written = n,
                    Err(e) => fatal!("writeback of block {}: {e}", msg.block),
                }
                debug!(
                    "writer persisted block {} index ({} bytes)",
                    msg.block, msg.bytes_written
                );
            }
            total_written += msg.bytes_written;
            self.response_tx
                .send(Message::Write(msg))
                .expect("response queue closed");
        }
        info!("writer wrote {total_written} bytes in total, shutting down");
    }
}
