//! FailureNotifier port - 既定の失敗通知
//!
//! callback が失敗を扱わないときに呼ばれます（proxy 側で抑止されていなければ）。

use crate::domain::ProxyError;

pub trait FailureNotifier: Send + Sync {
    fn notify(&self, error: &ProxyError);
}
