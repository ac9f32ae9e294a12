//! ActionTable - ActionKind ごとの handler 表
//!
//! # 設計原則
//! - LOAD / RETRY / REFRESH は必須（build 時に検証、不足は BuildError）
//! - REFRESH の handler は AUTO_REFRESH も兼ねる（個別に上書き可）
//! - LOAD_MORE は任意。ただし `paged()` の表では必須
//! - 表にない kind への dispatch はプログラミングエラー（panic）

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::{ActionKind, ActionParameter, Outcome};
use crate::error::BuildError;

use super::HandlerResult;

pub(crate) type OutcomeHandler<ID, D> =
    Arc<dyn Fn(&ID, ActionParameter, Outcome<D>) -> HandlerResult + Send + Sync>;

/// Routes an outcome to the handler registered for its action kind.
pub struct ActionTable<ID, D> {
    handlers: HashMap<ActionKind, OutcomeHandler<ID, D>>,
}

impl<ID, D> ActionTable<ID, D> {
    pub fn builder() -> ActionTableBuilder<ID, D> {
        ActionTableBuilder::new()
    }

    pub fn handles(&self, kind: ActionKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Registered kinds, in declaration order.
    pub fn kinds(&self) -> Vec<ActionKind> {
        ActionKind::ALL
            .into_iter()
            .filter(|kind| self.handles(*kind))
            .collect()
    }

    /// # Panics
    /// When no handler is registered for `action.kind()`.
    pub(crate) fn dispatch(&self, id: &ID, action: ActionParameter, outcome: Outcome<D>) -> HandlerResult {
        match self.handlers.get(&action.kind()) {
            Some(handler) => handler(id, action, outcome),
            None => panic!("no handler registered for action kind {:?}", action.kind()),
        }
    }
}

impl<ID, D> fmt::Debug for ActionTable<ID, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionTable")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// ActionTableBuilder は ActionTable を組み立てる
///
/// # 使用例
/// ```ignore
/// let table = ActionTable::builder()
///     .on_load(|id, _, outcome| { ... })
///     .on_retry(|id, _, outcome| { ... })
///     .on_refresh(|id, _, outcome| { ... })
///     .build()?;
/// ```
pub struct ActionTableBuilder<ID, D> {
    handlers: HashMap<ActionKind, OutcomeHandler<ID, D>>,
    paged: bool,
}

impl<ID, D> ActionTableBuilder<ID, D> {
    pub const REQUIRED: [ActionKind; 3] = [ActionKind::Load, ActionKind::Retry, ActionKind::Refresh];

    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            paged: false,
        }
    }

    pub fn on_load<F>(self, handler: F) -> Self
    where
        F: Fn(&ID, ActionParameter, Outcome<D>) -> HandlerResult + Send + Sync + 'static,
    {
        self.with(ActionKind::Load, Arc::new(handler))
    }

    pub fn on_retry<F>(self, handler: F) -> Self
    where
        F: Fn(&ID, ActionParameter, Outcome<D>) -> HandlerResult + Send + Sync + 'static,
    {
        self.with(ActionKind::Retry, Arc::new(handler))
    }

    /// Registers REFRESH, and AUTO_REFRESH unless it already has its own handler.
    pub fn on_refresh<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ID, ActionParameter, Outcome<D>) -> HandlerResult + Send + Sync + 'static,
    {
        let handler: OutcomeHandler<ID, D> = Arc::new(handler);
        self.handlers
            .entry(ActionKind::AutoRefresh)
            .or_insert_with(|| Arc::clone(&handler));
        self.with(ActionKind::Refresh, handler)
    }

    pub fn on_auto_refresh<F>(self, handler: F) -> Self
    where
        F: Fn(&ID, ActionParameter, Outcome<D>) -> HandlerResult + Send + Sync + 'static,
    {
        self.with(ActionKind::AutoRefresh, Arc::new(handler))
    }

    pub fn on_load_more<F>(self, handler: F) -> Self
    where
        F: Fn(&ID, ActionParameter, Outcome<D>) -> HandlerResult + Send + Sync + 'static,
    {
        self.with(ActionKind::LoadMore, Arc::new(handler))
    }

    /// Require a LOAD_MORE handler as well.
    pub fn paged(mut self) -> Self {
        self.paged = true;
        self
    }

    pub fn build(self) -> Result<ActionTable<ID, D>, BuildError> {
        let mut required = Self::REQUIRED.to_vec();
        if self.paged {
            required.push(ActionKind::LoadMore);
        }
        let missing: Vec<ActionKind> = required
            .into_iter()
            .filter(|kind| !self.handlers.contains_key(kind))
            .collect();
        if !missing.is_empty() {
            return Err(BuildError::MissingActionKinds(missing));
        }
        Ok(ActionTable {
            handlers: self.handlers,
        })
    }

    fn with(mut self, kind: ActionKind, handler: OutcomeHandler<ID, D>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }
}

impl<ID, D> Default for ActionTableBuilder<ID, D> {
    fn default() -> Self {
        Self::new()
    }
}
