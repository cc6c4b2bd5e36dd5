//! Fixed-size worker pool the executor fans map tasks out on.

use crossbeam::channel::{unbounded, Sender};
use crossbeam::sync::WaitGroup;
use log::debug;

pub type Job = Box<dyn FnOnce() + Send>;

pub struct ThreadPool {
    tx: Option<Sender<Job>>,
    handles: Vec<std::thread::JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new(parallelism: usize) -> Self {
        let (tx, rx) = unbounded::<Job>();
        let handles = (0..parallelism.max(1))
            .map(|i| {
                let rx = rx.clone();
                std::thread::Builder::new()
                    .name(format!("bg-worker-{i}"))
                    .spawn(move || {
                        for job in rx.iter() {
                            job();
                        }
                        debug!("worker {i} shutting down");
                    })
                    .expect("spawn worker thread")
            })
            .collect();
        ThreadPool {
            tx: Some(tx),
            handles,
        }
    }

    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        self.tx
            .as_ref()
            .expect("pool closed")
            .send(Box::new(job))
            .expect("worker pool hung up");
    }

    /// Submits a batch and blocks until every task in it has run.
    pub fn submit_and_wait(&self, jobs: Vec<Job>) {
        let wg = WaitGroup::new();
        for job in jobs {
            let w = wg.clone();
            self.submit(move || {
                job();
                drop(w);
            });
        }
        wg.wait();
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        drop(self.tx.take());
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}
