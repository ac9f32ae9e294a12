//! Callback - proxy に登録する結果の受け口
//!
//! 結果は `Outcome<D>`（成功値か ProxyError）1 つで渡り、
//! 完了通知はそれとは別の hook で届きます。

use std::fmt;

use crate::domain::{ActionParameter, Outcome};

use super::HandlerResult;
use super::table::ActionTable;

/// Whether a callback survives its first terminal dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallbackMode {
    /// Stays bound until `unbind()` or scope destroy.
    #[default]
    Persistent,
    /// The proxy unbinds right after the first completion.
    OneShot,
}

type OutcomeFn<ID, D> = Box<dyn Fn(&ID, ActionParameter, Outcome<D>) -> HandlerResult + Send + Sync>;
type SuccessFn<ID, D> = Box<dyn Fn(&ID, ActionParameter, D) -> HandlerResult + Send + Sync>;
type CompleteFn<ID> = Box<dyn Fn(&ID, ActionParameter) + Send + Sync>;

enum Handler<ID, D> {
    Outcome(OutcomeFn<ID, D>),
    Success(SuccessFn<ID, D>),
    Actions(ActionTable<ID, D>),
}

/// Handlers for one proxy's terminal events.
///
/// # 使用例
/// ```ignore
/// let callback = Callback::new(|id, action, outcome| {
///     match outcome {
///         Ok(user) => render(id, user),
///         Err(e) => show_error(e),
///     }
///     Ok(())
/// })
/// .on_complete(|_, _| stop_spinner())
/// .once();
/// ```
pub struct Callback<ID, D> {
    mode: CallbackMode,
    handler: Handler<ID, D>,
    on_complete: Option<CompleteFn<ID>>,
}

impl<ID, D> Callback<ID, D> {
    /// Receives both successes and failures.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&ID, ActionParameter, Outcome<D>) -> HandlerResult + Send + Sync + 'static,
    {
        Self::from_handler(Handler::Outcome(Box::new(handler)))
    }

    /// Receives successes only; failures fall back to the failure notifier.
    pub fn success<F>(handler: F) -> Self
    where
        F: Fn(&ID, ActionParameter, D) -> HandlerResult + Send + Sync + 'static,
    {
        Self::from_handler(Handler::Success(Box::new(handler)))
    }

    /// Routes by action kind.
    pub fn actions(table: ActionTable<ID, D>) -> Self {
        Self::from_handler(Handler::Actions(table))
    }

    pub fn once(mut self) -> Self {
        self.mode = CallbackMode::OneShot;
        self
    }

    pub fn on_complete<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ID, ActionParameter) + Send + Sync + 'static,
    {
        self.on_complete = Some(Box::new(hook));
        self
    }

    pub fn mode(&self) -> CallbackMode {
        self.mode
    }

    /// `false` for success-only callbacks.
    pub fn handles_failure(&self) -> bool {
        !matches!(self.handler, Handler::Success(_))
    }

    pub(crate) fn deliver(&self, id: &ID, action: ActionParameter, outcome: Outcome<D>) -> HandlerResult {
        match &self.handler {
            Handler::Outcome(handler) => handler(id, action, outcome),
            Handler::Success(handler) => match outcome {
                Ok(data) => handler(id, action, data),
                Err(_) => Ok(()),
            },
            Handler::Actions(table) => table.dispatch(id, action, outcome),
        }
    }

    pub(crate) fn complete(&self, id: &ID, action: ActionParameter) {
        if let Some(hook) = &self.on_complete {
            hook(id, action);
        }
    }

    fn from_handler(handler: Handler<ID, D>) -> Self {
        Self {
            mode: CallbackMode::default(),
            handler,
            on_complete: None,
        }
    }
}

impl<ID, D> fmt::Debug for Callback<ID, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handler = match &self.handler {
            Handler::Outcome(_) => "outcome",
            Handler::Success(_) => "success",
            Handler::Actions(_) => "actions",
        };
        f.debug_struct("Callback")
            .field("mode", &self.mode)
            .field("handler", &handler)
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}
