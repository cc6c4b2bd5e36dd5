//! Global vertex state: the `read[]` / `write[]` pair that kernels see.
//!
//! Both arrays are atomic cells of the algorithm's vertex-data type, so a
//! kernel's cross-vertex reads never tear and the combining writers need no
//! lock. Within a superstep all accesses are relaxed; the happens-before
//! between supersteps is the scheduler's single-threaded sync.

use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;

use crate::types::VertexId;

/// A vertex-data type the engine can host: `u16`, `u32` or `f32`.
pub trait VertexValue:
    Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static
{
    type Atomic: Send + Sync;

    fn new_atomic(v: Self) -> Self::Atomic;
    fn load(a: &Self::Atomic) -> Self;
    fn store(a: &Self::Atomic, v: Self);
    /// Atomically `*a = min(*a, v)`.
    fn store_min(a: &Self::Atomic, v: Self);
    /// Atomically `*a = max(*a, v)`.
    fn store_max(a: &Self::Atomic, v: Self);
    /// Atomically `*a = *a + v`.
    fn store_add(a: &Self::Atomic, v: Self);
}

impl VertexValue for u32 {
    type Atomic = AtomicU32;

    fn new_atomic(v: Self) -> AtomicU32 {
        AtomicU32::new(v)
    }
    fn load(a: &AtomicU32) -> Self {
        a.load(Ordering::Relaxed)
    }
    fn store(a: &AtomicU32, v: Self) {
        a.store(v, Ordering::Relaxed)
    }
    fn store_min(a: &AtomicU32, v: Self) {
        a.fetch_min(v, Ordering::Relaxed);
    }
    fn store_max(a: &AtomicU32, v: Self) {
        a.fetch_max(v, Ordering::Relaxed);
    }
    fn store_add(a: &AtomicU32, v: Self) {
        a.fetch_add(v, Ordering::Relaxed);
    }
}

impl VertexValue for u16 {
    type Atomic = AtomicU16;

    fn new_atomic(v: Self) -> AtomicU16 {
        AtomicU16::new(v)
    }
    fn load(a: &AtomicU16) -> Self {
        a.load(Ordering::Relaxed)
    }
    fn store(a: &AtomicU16, v: Self) {
        a.store(v, Ordering::Relaxed)
    }
    fn store_min(a: &AtomicU16, v: Self) {
        a.fetch_min(v, Ordering::Relaxed);
    }
    fn store_max(a: &AtomicU16, v: Self) {
        a.fetch_max(v, Ordering::Relaxed);
    }
    fn store_add(a: &AtomicU16, v: Self) {
        a.fetch_add(v, Ordering::Relaxed);
    }
}

// f32 rides on an AtomicU32 holding the bit pattern; the combining writers
// are compare-exchange loops.
impl VertexValue for f32 {
    type Atomic = AtomicU32;

    fn new_atomic(v: Self) -> AtomicU32 {
        AtomicU32::new(v.to_bits())
    }
    fn load(a: &AtomicU32) -> Self {
        f32::from_bits(a.load(Ordering::Relaxed))
    }
    fn store(a: &AtomicU32, v: Self) {
        a.store(v.to_bits(), Ordering::Relaxed)
    }
    fn store_min(a: &AtomicU32, v: Self) {
        fetch_update_f32(a, |cur| if v < cur { Some(v) } else { None });
    }
    fn store_max(a: &AtomicU32, v: Self) {
        fetch_update_f32(a, |cur| if v > cur { Some(v) } else { None });
    }
    fn store_add(a: &AtomicU32, v: Self) {
        fetch_update_f32(a, |cur| Some(cur + v));
    }
}

fn fetch_update_f32(a: &AtomicU32, f: impl Fn(f32) -> Option<f32>) {
    let mut cur = a.load(Ordering::Relaxed);
    loop {
        let Some(new) = f(f32::from_bits(cur)) else {
            return;
        };
        match a.compare_exchange_weak(cur, new.to_bits(), Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return,
            Err(seen) => cur = seen,
        }
    }
}

/// Type-erased handle the scheduler uses to run the superstep sync.
pub trait StateSync: Send + Sync {
    fn sync(&self);
}

pub struct VertexState<T: VertexValue> {
    read: Arc<[T::Atomic]>,
    write: Arc<[T::Atomic]>,
    read_only_sync: bool,
}

impl<T: VertexValue> VertexState<T> {
    /// `read_only_sync` aliases `write` onto `read`: kernels that declare
    /// the read-only contract (coloring) intentionally observe their own
    /// writes within a superstep, and `sync` is a no-op.
    pub fn new(num_vertices: usize, read_only_sync: bool) -> Self {
        let read: Arc<[T::Atomic]> = (0..num_vertices)
            .map(|_| T::new_atomic(T::default()))
            .collect::<Vec<_>>()
            .into();
        let write = if read_only_sync {
            read.clone()
        } else {
            (0..num_vertices)
                .map(|_| T::new_atomic(T::default()))
                .collect::<Vec<_>>()
                .into()
        };
        VertexState {
            read,
            write,
            read_only_sync,
        }
    }

    pub fn len(&self) -> usize {
        self.read.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read.is_empty()
    }

    pub fn read(&self, v: VertexId) -> T {
        T::load(&self.read[v as usize])
    }

    /// Last-writer-wins store. Reserved for initialization and algorithms
    /// whose combine is idempotent assignment.
    pub fn write(&self, v: VertexId, x: T) {
        T::store(&self.write[v as usize], x)
    }

    pub fn write_min(&self, v: VertexId, x: T) {
        T::store_min(&self.write[v as usize], x)
    }

    pub fn write_max(&self, v: VertexId, x: T) {
        T::store_max(&self.write[v as usize], x)
    }

    pub fn write_add(&self, v: VertexId, x: T) {
        T::store_add(&self.write[v as usize], x)
    }

    /// Bulk store into `write[]`. Single-threaded use between supersteps
    /// (PageRank zeroes its accumulator this way).
    pub fn reset_write(&self, x: T) {
        for a in self.write.iter() {
            T::store(a, x);
        }
    }

    /// Copies `write[]` over `read[]`; no-op under the read-only contract.
    pub fn sync(&self) {
        if self.read_only_sync {
            return;
        }
        for (r, w) in self.read.iter().zip(self.write.iter()) {
            T::store(r, T::load(w));
        }
    }

    pub fn snapshot_read(&self) -> Vec<T> {
        self.read.iter().map(T::load).collect()
    }
}

impl<T: VertexValue> StateSync for VertexState<T> {
    fn sync(&self) {
        VertexState::sync(self)
    }
}
