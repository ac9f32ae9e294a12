//! Scope - in-memory の ScopeOwner 実装
//!
//! # 実装詳細
//! - observer は登録順に保持し、destroy 時にその順で通知する
//! - 通知はロックの外で行う（observer が remove_observer を呼んでもよい）
//! - destroy 済みの scope に登録された observer には即座に通知する

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::{ObserverId, ScopeId};
use crate::ports::{IdGenerator, ScopeObserver, ScopeOwner};

#[derive(Default)]
struct ScopeState {
    destroyed: bool,
    observers: Vec<(ObserverId, Arc<dyn ScopeObserver>)>,
}

pub struct Scope {
    id: ScopeId,
    ids: Arc<dyn IdGenerator>,
    state: Mutex<ScopeState>,
}

impl Scope {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            id: ids.generate_scope_id(),
            ids,
            state: Mutex::new(ScopeState::default()),
        }
    }

    /// End the scope and notify every observer. Later calls do nothing.
    pub fn destroy(&self) {
        let observers = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            std::mem::take(&mut state.observers)
        };
        tracing::debug!(scope = %self.id, observers = observers.len(), "scope destroyed");
        for (_, observer) in observers {
            observer.on_destroy(self.id);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }
}

impl ScopeOwner for Scope {
    fn scope_id(&self) -> ScopeId {
        self.id
    }

    fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    fn add_observer(&self, observer: Arc<dyn ScopeObserver>) -> ObserverId {
        let id = self.ids.generate_observer_id();
        {
            let mut state = self.state.lock();
            if !state.destroyed {
                state.observers.push((id, observer));
                return id;
            }
        }
        observer.on_destroy(self.id);
        id
    }

    fn remove_observer(&self, observer: ObserverId) {
        self.state.lock().observers.retain(|(id, _)| *id != observer);
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("destroyed", &state.destroyed)
            .field("observers", &state.observers.len())
            .finish()
    }
}
