use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{anyhow, Result};
use tokio::sync::oneshot;
use tracing::{error, info};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size set of long-lived OS threads for blocking inference work. The
/// request layer enqueues a closure and suspends on a oneshot until a worker
/// has run it, so blocking calls never land on the async executor.
///
/// The queue is unbounded on purpose, matching the service contract: callers
/// see growing latency rather than rejections. A production-grade deployment
/// needs a bounded queue with shedding in front of this.
pub struct InferencePool {
    tx: mpsc::Sender<Job>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl InferencePool {
    pub fn new(workers: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let workers: Vec<_> = (0..workers)
            .map(|i| {
                let rx = Arc::clone(&rx);
                thread::Builder::new()
                    .name(format!("infer-{i}"))
                    .spawn(move || worker_loop(&rx))
                    .expect("failed to spawn inference worker")
            })
            .collect();
        info!(count = workers.len(), "inference pool started");
        Self { tx, workers }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Runs `job` on the next free worker and suspends until it completes.
    /// If the caller stops awaiting, the job still runs to completion so any
    /// cache population it performs benefits later requests.
    pub async fn submit<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let boxed: Job = Box::new(move || {
            // The receiver may be gone when the request was abandoned.
            let _ = done_tx.send(job());
        });
        self.tx
            .send(boxed)
            .map_err(|_| anyhow!("inference pool has shut down"))?;
        done_rx
            .await
            .map_err(|_| anyhow!("inference worker exited before completing the job"))
    }
}

fn worker_loop(rx: &Mutex<mpsc::Receiver<Job>>) {
    loop {
        let job = {
            let Ok(guard) = rx.lock() else { return };
            guard.recv()
        };
        match job {
            Ok(job) => {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!("inference job panicked");
                }
            }
            // All senders gone, the pool was dropped.
            Err(_) => return,
        }
    }
}
