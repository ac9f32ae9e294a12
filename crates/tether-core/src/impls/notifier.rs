//! LogNotifier - 既定の失敗通知を tracing に出す

use crate::domain::ProxyError;
use crate::ports::FailureNotifier;

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl FailureNotifier for LogNotifier {
    fn notify(&self, error: &ProxyError) {
        tracing::warn!(code = error.code(), kind = ?error.kind(), "{error}");
    }
}
