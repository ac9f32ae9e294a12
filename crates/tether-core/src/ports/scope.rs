//! ScopeOwner port - ライフサイクル境界（画面など）の抽象化
//!
//! # 設計原則
//! - proxy は bind 時に observer を登録し、destroy 通知で後始末する
//! - observer の登録解除は proxy 自身が行う（destroy 通知の中からでも呼べること）

use std::sync::Arc;

use crate::domain::{ObserverId, ScopeId};

/// ScopeObserver は destroy 通知を受け取る
pub trait ScopeObserver: Send + Sync {
    fn on_destroy(&self, scope: ScopeId);
}

/// ScopeOwner は proxy が bind する外部のライフサイクル
pub trait ScopeOwner: Send + Sync {
    fn scope_id(&self) -> ScopeId;

    /// Terminal state: once true it never goes back to false.
    fn is_destroyed(&self) -> bool;

    fn add_observer(&self, observer: Arc<dyn ScopeObserver>) -> ObserverId;

    fn remove_observer(&self, observer: ObserverId);
}
