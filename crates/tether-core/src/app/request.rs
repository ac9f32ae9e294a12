//! RequestHandle - 実行中の 1 リクエストの取消ハンドル
//!
//! # 状態遷移
//! ```text
//! Running ──finish()──▶ Finished
//!    │
//!    └──achieve()──▶ Cancelled   (task を abort し、on_cancel を一度だけ呼ぶ)
//! ```
//! Finished / Cancelled からの `achieve()` は何もしない（acknowledge）。

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;
use tokio::task::AbortHandle;

use crate::cancellation::Cancellable;
use crate::domain::{CancelError, HandleId};

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const CANCELLED: u8 = 2;

type OnCancel = Box<dyn Fn() + Send + Sync>;

pub struct RequestHandle {
    id: HandleId,
    state: AtomicU8,
    abort: Mutex<Option<AbortHandle>>,
    on_cancel: OnCancel,
}

impl RequestHandle {
    pub fn new<F>(id: HandleId, on_cancel: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            id,
            state: AtomicU8::new(RUNNING),
            abort: Mutex::new(None),
            on_cancel: Box::new(on_cancel),
        }
    }

    /// Attach the spawned task. A handle cancelled before this aborts it at once.
    pub fn attach(&self, task: AbortHandle) {
        let mut slot = self.abort.lock();
        if self.state.load(Ordering::Acquire) == CANCELLED {
            task.abort();
            return;
        }
        *slot = Some(task);
    }

    /// Mark the request as finished. `false` when it was cancelled first.
    pub fn finish(&self) -> bool {
        let finished = self
            .state
            .compare_exchange(RUNNING, FINISHED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if finished {
            self.abort.lock().take();
        }
        finished
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }
}

impl Cancellable for RequestHandle {
    fn handle_id(&self) -> HandleId {
        self.id
    }

    fn is_achieved(&self) -> bool {
        self.state.load(Ordering::Acquire) != RUNNING
    }

    fn achieve(&self) -> Result<(), CancelError> {
        if self
            .state
            .compare_exchange(RUNNING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }
        let task = self.abort.lock().take();
        if let Some(task) = task {
            task.abort();
        }
        tracing::debug!(handle = %self.id, "request cancelled");
        (self.on_cancel)();
        Ok(())
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state.load(Ordering::Acquire) {
            RUNNING => "running",
            FINISHED => "finished",
            _ => "cancelled",
        };
        f.debug_struct("RequestHandle")
            .field("id", &self.id)
            .field("state", &state)
            .finish()
    }
}
