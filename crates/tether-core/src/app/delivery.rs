//! DeliveryContext - 終端 callback を実行する単一の FIFO ループ
//!
//! # 設計原則
//! - ジョブは投入順に 1 つずつ実行する（callback 同士は並行しない）
//! - shutdown は投入済みのジョブを流し切ってから止まる
//! - ジョブ内の panic は握りつぶさない: ループごと止まり、`shutdown()` で呼び出し元に再送出される

use std::panic::resume_unwind;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the delivery loop. Cheap to clone.
#[derive(Clone)]
pub struct DeliveryContext {
    jobs_tx: mpsc::UnboundedSender<Job>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    join: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl DeliveryContext {
    /// Start the loop on `runtime`.
    pub fn spawn(runtime: &Handle) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = runtime.spawn(delivery_loop(jobs_rx, shutdown_rx));
        Self {
            jobs_tx,
            shutdown_tx: Arc::new(shutdown_tx),
            join: Arc::new(Mutex::new(Some(join))),
        }
    }

    /// Queue `job` behind everything already posted.
    ///
    /// Returns `false` when the loop has stopped (shut down, or killed by a
    /// panicking job); the job is dropped.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if *self.shutdown_tx.borrow() {
            tracing::warn!("delivery context is shut down; job dropped");
            return false;
        }
        if self.jobs_tx.send(Box::new(job)).is_err() {
            tracing::warn!("delivery loop is gone; job dropped");
            return false;
        }
        true
    }

    /// Wait until every job posted before this call has run.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.post(move || {
            // ignore send error: the waiter may have given up
            let _ = done_tx.send(());
        }) {
            let _ = done_rx.await;
        }
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Drain queued jobs, then stop the loop and wait for it.
    ///
    /// # Panics
    /// Re-raises the panic of a job that killed the loop.
    pub async fn shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
        let join = self.join.lock().take();
        let Some(join) = join else {
            return;
        };
        if let Err(e) = join.await {
            if e.is_panic() {
                tracing::error!("delivery loop was stopped by a panicking job");
                resume_unwind(e.into_panic());
            }
        }
    }
}

async fn delivery_loop(mut jobs_rx: mpsc::UnboundedReceiver<Job>, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        // 溜まっているジョブを優先する（shutdown 前に流し切る）
        let job = tokio::select! {
            biased;
            job = jobs_rx.recv() => job,
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    jobs_rx.close();
                    while let Ok(job) = jobs_rx.try_recv() {
                        job();
                    }
                    break;
                }
                continue;
            }
        };
        let Some(job) = job else {
            break;
        };
        job();
    }
    tracing::debug!("delivery loop stopped");
}
