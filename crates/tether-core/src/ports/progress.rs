//! ProgressSink port - 進捗表示（loading 表示）の抽象化
//!
//! show / hide は fire-and-forget です。戻り値はありません。

use crate::domain::ScopeId;

/// Where progress is shown and with which text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressContext {
    pub scope: ScopeId,
    pub text: String,
}

impl ProgressContext {
    pub const DEFAULT_TEXT: &'static str = "Please wait...";

    pub fn new(scope: ScopeId, text: impl Into<String>) -> Self {
        Self {
            scope,
            text: text.into(),
        }
    }

    pub fn with_default_text(scope: ScopeId) -> Self {
        Self::new(scope, Self::DEFAULT_TEXT)
    }
}

/// ProgressSink は進捗表示を出したり消したりする
pub trait ProgressSink: Send + Sync {
    fn show(&self, context: &ProgressContext);

    fn hide(&self, context: &ProgressContext);
}
