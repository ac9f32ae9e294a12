//! CallbackDispatcher - 終端イベントを callback に振り分ける
//!
//! # 設計原則
//! - handler はスロットのロックの外で呼ぶ（handler から proxy を触ってよい）
//! - handler のエラーは Unexpected に変換して failure 経路へ一度だけ回す
//! - destroy 済みの proxy からは何も通知しない（警告も出さない）

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::{ActionParameter, ProxyError};
use crate::ports::FailureNotifier;

use super::callback::{Callback, CallbackMode};

pub struct CallbackDispatcher<ID, D> {
    slot: Mutex<Option<Arc<Callback<ID, D>>>>,
    notifier: Arc<dyn FailureNotifier>,
    notify_failures: bool,
}

impl<ID: Debug, D> CallbackDispatcher<ID, D> {
    pub fn new(notifier: Arc<dyn FailureNotifier>, notify_failures: bool) -> Self {
        Self {
            slot: Mutex::new(None),
            notifier,
            notify_failures,
        }
    }

    /// Install `callback`, returning the one it replaced.
    pub fn install(&self, callback: Arc<Callback<ID, D>>) -> Option<Arc<Callback<ID, D>>> {
        self.slot.lock().replace(callback)
    }

    pub fn clear(&self) -> Option<Arc<Callback<ID, D>>> {
        self.slot.lock().take()
    }

    pub fn current(&self) -> Option<Arc<Callback<ID, D>>> {
        self.slot.lock().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// `callback` is the very instance currently installed.
    pub fn is_current(&self, callback: &Arc<Callback<ID, D>>) -> bool {
        self.slot
            .lock()
            .as_ref()
            .is_some_and(|installed| Arc::ptr_eq(installed, callback))
    }

    pub fn on_success(&self, id: &ID, action: ActionParameter, data: D, destroyed: bool) {
        let Some(callback) = self.current() else {
            if !destroyed {
                tracing::warn!(?id, ?action, "result arrived with no callback bound");
            }
            return;
        };
        if let Err(e) = callback.deliver(id, action, Ok(data)) {
            tracing::debug!(?id, error = %e, "success handler failed; rerouting");
            self.fail(id, action, ProxyError::unexpected(&e), destroyed, true);
        }
    }

    pub fn on_failure(&self, id: &ID, action: ActionParameter, error: ProxyError, destroyed: bool) {
        self.fail(id, action, error, destroyed, false);
    }

    /// Run the completion hook and report the mode of the callback that saw it.
    pub fn on_complete(&self, id: &ID, action: ActionParameter) -> Option<CallbackMode> {
        let callback = self.current()?;
        callback.complete(id, action);
        Some(callback.mode())
    }

    fn fail(&self, id: &ID, action: ActionParameter, error: ProxyError, destroyed: bool, rerouted: bool) {
        if destroyed {
            tracing::debug!(?id, error = %error, "failure dropped after destroy");
            return;
        }
        let callback = match self.current() {
            Some(callback) if callback.handles_failure() => callback,
            _ => {
                self.notify(&error);
                return;
            }
        };
        let Err(e) = callback.deliver(id, action, Err(error)) else {
            return;
        };
        if rerouted {
            tracing::error!(?id, ?action, error = %e, "failure handler failed while handling a handler error");
        } else {
            tracing::debug!(?id, error = %e, "failure handler failed; rerouting");
            self.fail(id, action, ProxyError::unexpected(&e), destroyed, true);
        }
    }

    fn notify(&self, error: &ProxyError) {
        if self.notify_failures {
            self.notifier.notify(error);
        } else {
            tracing::debug!(error = %error, code = error.code(), "failure notice suppressed");
        }
    }
}
