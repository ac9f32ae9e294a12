//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（Clock から timestamp 部分を取る）

use crate::domain::ids::{HandleId, ObserverId, ProxyId, ScopeId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は各種 ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（delivery loop と worker の両方から使う）
pub trait IdGenerator: Send + Sync {
    fn generate_proxy_id(&self) -> ProxyId;

    fn generate_handle_id(&self) -> HandleId;

    fn generate_scope_id(&self) -> ScopeId;

    fn generate_observer_id(&self) -> ObserverId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// FixedClock を渡すと timestamp 部分が決定的になります（ランダム部分は異なる）。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_proxy_id(&self) -> ProxyId {
        ProxyId::from(self.next_ulid())
    }

    fn generate_handle_id(&self) -> HandleId {
        HandleId::from(self.next_ulid())
    }

    fn generate_scope_id(&self) -> ScopeId {
        ScopeId::from(self.next_ulid())
    }

    fn generate_observer_id(&self) -> ObserverId {
        ObserverId::from(self.next_ulid())
    }
}
