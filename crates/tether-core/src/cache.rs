//! WorkUnitCache - 再利用可能な WorkUnit の LRU キャッシュ
//!
//! # 設計原則
//! - 暗黙のグローバルではなく、factory が持つ明示的なコンポーネント
//! - 値は型消去して保持する（データ型の違う proxy 同士で 1 つの cache を共有する）
//! - 追い出しは何も取消さない（WorkUnit はレシピでしかない）
//! - 同じ key への同時 get-or-create は調停しない（二重生成は無害、後勝ち）

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::RequestKey;

type Erased = Arc<dyn Any + Send + Sync>;

/// Result of a lookup-or-create.
pub enum Cached<T> {
    Hit(Arc<T>),
    Created(Arc<T>),
}

impl<T> Cached<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, Cached::Hit(_))
    }

    pub fn into_inner(self) -> Arc<T> {
        match self {
            Cached::Hit(value) | Cached::Created(value) => value,
        }
    }
}

struct Slot {
    value: Erased,
    last_used: u64,
}

#[derive(Default)]
struct LruState {
    slots: HashMap<RequestKey, Slot>,
    tick: u64,
}

impl LruState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn evict_over(&mut self, capacity: usize) -> Vec<RequestKey> {
        let mut evicted = Vec::new();
        while self.slots.len() > capacity {
            let Some(victim) = self
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(key, _)| *key)
            else {
                break;
            };
            self.slots.remove(&victim);
            evicted.push(victim);
        }
        evicted
    }
}

/// Bounded least-recently-used map from `RequestKey` to work units.
pub struct WorkUnitCache {
    capacity: usize,
    state: Mutex<LruState>,
}

impl WorkUnitCache {
    pub const DEFAULT_CAPACITY: usize = 5;

    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(LruState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Return the cached value for `key`, or build one with `factory`.
    ///
    /// The factory runs without the lock held. A slot holding a value of a
    /// different type counts as a miss and is replaced.
    pub fn get_or_create<T, F>(&self, key: RequestKey, factory: F) -> Cached<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        if let Some(hit) = self.get::<T>(key) {
            return Cached::Hit(hit);
        }

        let created = Arc::new(factory());
        let erased: Erased = created.clone();
        let evicted = {
            let mut state = self.state.lock();
            let last_used = state.next_tick();
            state.slots.insert(
                key,
                Slot {
                    value: erased,
                    last_used,
                },
            );
            state.evict_over(self.capacity)
        };
        for victim in evicted {
            tracing::trace!(key = %victim, "work unit evicted");
        }
        Cached::Created(created)
    }

    /// Look up `key`, marking it most recently used on a hit.
    pub fn get<T>(&self, key: RequestKey) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let mut state = self.state.lock();
        let tick = state.next_tick();
        let slot = state.slots.get_mut(&key)?;
        let value = slot.value.clone().downcast::<T>().ok()?;
        slot.last_used = tick;
        Some(value)
    }

    pub fn contains(&self, key: RequestKey) -> bool {
        self.state.lock().slots.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry (process-wide reset).
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let dropped = state.slots.len();
        state.slots.clear();
        tracing::debug!(dropped, "work unit cache cleared");
    }
}

impl Default for WorkUnitCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
