//! CancellationSet - スコープ単位の取消ハンドル集合
//!
//! # 設計原則
//! - 要素が減るのは `remove` / `clear` / `achieve` のときだけ
//! - ハンドルの `achieve()` はロックの外で呼ぶ（ハンドル側が proxy に触れるため）
//! - 集合全体の `achieve()` は一度だけ効く終端遷移

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::domain::{CancelError, HandleId};

/// One in-flight operation that can be cancelled or acknowledged.
///
/// Cancellation is best-effort: an operation whose terminal event is already
/// queued for delivery may still be delivered after `achieve()` returns.
pub trait Cancellable: Send + Sync {
    fn handle_id(&self) -> HandleId;

    /// Already finished or cancelled.
    fn is_achieved(&self) -> bool;

    /// Cancel if still running, otherwise acknowledge. Idempotent.
    fn achieve(&self) -> Result<(), CancelError>;
}

/// Thread-safe bag of handles for one scope.
#[derive(Default)]
pub struct CancellationSet {
    handles: Mutex<HashMap<HandleId, Arc<dyn Cancellable>>>,
    achieved: AtomicBool,
}

impl CancellationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `handle`. Skipped when the handle is already achieved or the set
    /// itself has been achieved.
    pub fn add(&self, handle: Arc<dyn Cancellable>) {
        if handle.is_achieved() {
            return;
        }
        if self.achieved.load(Ordering::Acquire) {
            return;
        }
        let mut handles = self.handles.lock();
        // achieve() と競合したときのために lock 内で再確認する
        if !self.achieved.load(Ordering::Acquire) {
            handles.insert(handle.handle_id(), handle);
        }
    }

    /// Remove the handle and achieve it if it was a member.
    pub fn remove(&self, handle: &dyn Cancellable) -> Result<(), CancelError> {
        if self.achieved.load(Ordering::Acquire) {
            return Ok(());
        }
        let removed = self.handles.lock().remove(&handle.handle_id());
        match removed {
            Some(member) => member.achieve(),
            None => Ok(()),
        }
    }

    /// Achieve every current member and leave the set empty but usable.
    pub fn clear(&self) -> Result<(), CancelError> {
        if self.achieved.load(Ordering::Acquire) {
            return Ok(());
        }
        let drained = std::mem::take(&mut *self.handles.lock());
        achieve_all(drained)
    }

    /// One-time terminal transition: the first caller clears, later calls are no-ops.
    pub fn achieve(&self) -> Result<(), CancelError> {
        let drained = {
            let mut handles = self.handles.lock();
            if self.achieved.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            std::mem::take(&mut *handles)
        };
        achieve_all(drained)
    }

    pub fn is_achieved(&self) -> bool {
        self.achieved.load(Ordering::Acquire)
    }

    pub fn has_members(&self) -> bool {
        if self.achieved.load(Ordering::Acquire) {
            return false;
        }
        let handles = self.handles.lock();
        !self.achieved.load(Ordering::Acquire) && !handles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, handle: HandleId) -> bool {
        self.handles.lock().contains_key(&handle)
    }
}

/// 全部試してから失敗をまとめて返す
fn achieve_all(handles: HashMap<HandleId, Arc<dyn Cancellable>>) -> Result<(), CancelError> {
    let errors: Vec<CancelError> = handles
        .into_values()
        .filter_map(|handle| handle.achieve().err())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(CancelError::Composite(errors))
    }
}
