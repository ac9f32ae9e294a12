//! LogProgress - 進捗表示を tracing に出す ProgressSink

use crate::ports::{ProgressContext, ProgressSink};

#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn show(&self, context: &ProgressContext) {
        tracing::info!(scope = %context.scope, "{}", context.text);
    }

    fn hide(&self, context: &ProgressContext) {
        tracing::debug!(scope = %context.scope, "progress hidden");
    }
}
