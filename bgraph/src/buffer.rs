//! Edge buffer: byte-budget admission for resident sub-block edge data and
//! the ready queue that hands freshly resident sub-blocks to the executor.
//!
//! One mutex guards the flag vectors and the byte accounting; one condvar
//! wakes blocked admissions when `finish` refunds bytes. The ready queue is
//! FIFO in completion order, not sub-block id order; the map primitives
//! process each sub-block independently, so order does not matter.

use std::sync::{Condvar, Mutex};

use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};

use crate::meta::GraphMeta;
use crate::types::{BlockId, SubBlockId, SUB_BLOCK_SENTINEL};

#[derive(Default, Clone, Copy)]
struct SubState {
    active: bool,
    reading: bool,
    in_memory: bool,
    finished: bool,
    size: u64,
}

struct Inner {
    budget: u64,
    used: u64,
    peak: u64,
    total_loaded: u64,
    subs: Vec<Vec<SubState>>,
}

pub struct EdgeBuffer {
    inner: Mutex<Inner>,
    space: Condvar,
    ready_tx: Sender<SubBlockId>,
    ready_rx: Receiver<SubBlockId>,
}

impl EdgeBuffer {
    pub fn new(meta: &GraphMeta, budget: u64) -> Self {
        let subs = meta
            .blocks
            .iter()
            .map(|b| vec![SubState::default(); b.num_sub_blocks as usize])
            .collect();
        let (ready_tx, ready_rx) = unbounded();
        EdgeBuffer {
            inner: Mutex::new(Inner {
                budget,
                used: 0,
                peak: 0,
                total_loaded: 0,
                subs,
            }),
            space: Condvar::new(),
            ready_tx,
            ready_rx,
        }
    }

    /// Marks the round's scheduled sub-blocks of `block`.
    pub fn activate(&self, block: BlockId, subs: &[SubBlockId]) {
        let mut g = self.inner.lock().unwrap();
        for s in &mut g.subs[block as usize] {
            s.active = false;
        }
        for &s in subs {
            g.subs[block as usize][s as usize].active = true;
        }
    }

    /// Whether `size` more bytes fit right now.
    pub fn is_enough(&self, size: u64) -> bool {
        let g = self.inner.lock().unwrap();
        g.used + size <= g.budget
    }

    /// Non-blocking admission. On success the bytes are debited and the
    /// sub-block is `reading`.
    pub fn try_apply(&self, block: BlockId, sub: SubBlockId, size: u64) -> bool {
        let mut g = self.inner.lock().unwrap();
        if g.used + size > g.budget {
            return false;
        }
        Self::admit(&mut g, block, sub, size);
        true
    }

    /// Blocking admission: waits on the condvar until `finish` has refunded
    /// enough bytes. The caller must guarantee `size` fits the budget at
    /// all (checked at engine start), otherwise this is a logic bug.
    pub fn apply(&self, block: BlockId, sub: SubBlockId, size: u64) {
        let mut g = self.inner.lock().unwrap();
        if size > g.budget {
            panic!(
                "edge buffer budget invariant broken: sub-block {sub} of block {block} \
                 needs {size} bytes, budget is {}",
                g.budget
            );
        }
        while g.used + size > g.budget {
            g = self.space.wait(g).unwrap();
        }
        Self::admit(&mut g, block, sub, size);
    }

    fn admit(g: &mut Inner, block: BlockId, sub: SubBlockId, size: u64) {
        let st = &mut g.subs[block as usize][sub as usize];
        debug_assert!(!st.reading && !st.in_memory);
        st.reading = true;
        st.finished = false;
        st.size = size;
        g.used += size;
        g.peak = g.peak.max(g.used);
    }

    /// Reader signals a completed sub-block load; the executor will see it
    /// on the ready queue.
    pub fn push_loaded(&self, block: BlockId, sub: SubBlockId) {
        {
            let mut g = self.inner.lock().unwrap();
            let st = &mut g.subs[block as usize][sub as usize];
            debug_assert!(st.reading && !st.in_memory);
            st.reading = false;
            st.in_memory = true;
            let size = st.size;
            g.total_loaded += size;
        }
        self.ready_tx.send(sub).expect("ready queue closed");
    }

    /// End of the current block's ready run.
    pub fn push_sentinel(&self) {
        self.ready_tx
            .send(SUB_BLOCK_SENTINEL)
            .expect("ready queue closed");
    }

    pub fn pop_ready(&self) -> SubBlockId {
        self.ready_rx.recv().expect("ready queue closed")
    }

    pub fn try_pop_ready(&self) -> Option<SubBlockId> {
        match self.ready_rx.try_recv() {
            Ok(s) => Some(s),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => unreachable!("ready queue closed"),
        }
    }

    /// Executor declares the sub-block fully consumed; its bytes return to
    /// the budget. The caller has already released the edge array.
    pub fn finish(&self, block: BlockId, sub: SubBlockId) {
        let mut g = self.inner.lock().unwrap();
        let st = &mut g.subs[block as usize][sub as usize];
        debug_assert!(st.in_memory);
        st.in_memory = false;
        st.finished = true;
        let size = st.size;
        g.used -= size;
        drop(g);
        self.space.notify_all();
    }

    /// Shrinks a resident sub-block's accounted size after an in-memory
    /// compaction.
    pub fn resize_resident(&self, block: BlockId, sub: SubBlockId, new_size: u64) {
        let mut g = self.inner.lock().unwrap();
        let st = &mut g.subs[block as usize][sub as usize];
        debug_assert!(st.in_memory && new_size <= st.size);
        let delta = st.size - new_size;
        st.size = new_size;
        g.used -= delta;
        drop(g);
        self.space.notify_all();
    }

    /// Tears down every resident sub-block of `block`; used between rounds
    /// and at shutdown. The caller releases the edge arrays.
    pub fn release_all(&self, block: BlockId) {
        let mut g = self.inner.lock().unwrap();
        let mut freed = 0;
        for st in &mut g.subs[block as usize] {
            if st.in_memory {
                st.in_memory = false;
                freed += st.size;
            }
            st.reading = false;
            st.finished = false;
        }
        g.used -= freed;
        drop(g);
        self.space.notify_all();
    }

    pub fn in_memory(&self, block: BlockId, sub: SubBlockId) -> bool {
        self.inner.lock().unwrap().subs[block as usize][sub as usize].in_memory
    }

    pub fn used_bytes(&self) -> u64 {
        self.inner.lock().unwrap().used
    }

    /// High-water mark of `reading ∨ in_memory` bytes.
    pub fn peak_bytes(&self) -> u64 {
        self.inner.lock().unwrap().peak
    }

    pub fn total_loaded_bytes(&self) -> u64 {
        self.inner.lock().unwrap().total_loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{BlockMeta, SubBlockMeta};

    fn meta_one_block(num_subs: u32, edges_per_sub: u64) -> GraphMeta {
        let sub_blocks = (0..num_subs)
            .map(|i| SubBlockMeta {
                id: i,
                begin_id: i * 2,
                end_id: (i + 1) * 2,
                num_edges: edges_per_sub,
                begin_offset: u64::from(i) * edges_per_sub,
            })
            .collect();
        GraphMeta {
            num_vertices: num_subs * 2,
            num_edges: u64::from(num_subs) * edges_per_sub,
            num_blocks: 1,
            blocks: vec![BlockMeta {
                id: 0,
                begin_id: 0,
                end_id: num_subs * 2,
                num_vertices: num_subs * 2,
                num_edges: u64::from(num_subs) * edges_per_sub,
                offset_ratio: 2,
                num_sub_blocks: num_subs,
                sub_blocks,
            }],
        }
    }

    #[test]
    fn budget_accounting() {
        let meta = meta_one_block(4, 4); // 16 bytes per sub-block
        let buf = EdgeBuffer::new(&meta, 32);
        assert!(buf.try_apply(0, 0, 16));
        assert!(buf.try_apply(0, 1, 16));
        assert!(!buf.is_enough(16));
        assert!(!buf.try_apply(0, 2, 16));
        buf.push_loaded(0, 0);
        buf.finish(0, 0);
        assert!(buf.try_apply(0, 2, 16));
        assert_eq!(buf.used_bytes(), 32);
        assert_eq!(buf.peak_bytes(), 32);
    }

    #[test]
    fn budget_equal_to_largest_sub_block_admits_one_at_a_time() {
        let meta = meta_one_block(3, 4);
        let buf = EdgeBuffer::new(&meta, 16);
        assert!(buf.try_apply(0, 0, 16));
        assert!(!buf.try_apply(0, 1, 16));
        buf.push_loaded(0, 0);
        buf.finish(0, 0);
        assert!(buf.try_apply(0, 1, 16));
    }

    #[test]
    fn ready_queue_is_fifo_with_sentinel() {
        let meta = meta_one_block(3, 4);
        let buf = EdgeBuffer::new(&meta, 64);
        buf.try_apply(0, 2, 16);
        buf.try_apply(0, 0, 16);
        buf.push_loaded(0, 2);
        buf.push_loaded(0, 0);
        buf.push_sentinel();
        assert_eq!(buf.pop_ready(), 2);
        assert_eq!(buf.pop_ready(), 0);
        assert_eq!(buf.pop_ready(), SUB_BLOCK_SENTINEL);
        assert_eq!(buf.try_pop_ready(), None);
    }

    #[test]
    fn blocking_apply_waits_for_finish() {
        let meta = meta_one_block(2, 4);
        let buf = std::sync::Arc::new(EdgeBuffer::new(&meta, 16));
        buf.try_apply(0, 0, 16);
        buf.push_loaded(0, 0);
        let b2 = buf.clone();
        let h = std::thread::spawn(move || {
            b2.apply(0, 1, 16);
            b2.used_bytes()
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        buf.finish(0, 0);
        assert_eq!(h.join().unwrap(), 16);
    }

    #[test]
    fn release_all_refunds_residents() {
        let meta = meta_one_block(2, 4);
        let buf = EdgeBuffer::new(&meta, 64);
        buf.try_apply(0, 0, 16);
        buf.try_apply(0, 1, 16);
        buf.push_loaded(0, 0);
        buf.push_loaded(0, 1);
        buf.release_all(0);
        assert_eq!(buf.used_bytes(), 0);
        assert!(!buf.in_memory(0, 0));
    }

    #[test]
    fn resize_resident_refunds_the_delta() {
        let meta = meta_one_block(1, 4);
        let buf = EdgeBuffer::new(&meta, 16);
        buf.try_apply(0, 0, 16);
        buf.push_loaded(0, 0);
        buf.resize_resident(0, 0, 4);
        assert_eq!(buf.used_bytes(), 4);
    }
}
