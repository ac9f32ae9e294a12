//! ConnectivityProbe port - 接続可否の問い合わせ
//!
//! `request()` の直前に同期的に呼ばれます（network check が有効な場合のみ）。

/// ConnectivityProbe は現在ネットワークが使えるかを返す
pub trait ConnectivityProbe: Send + Sync {
    fn is_available(&self) -> bool;
}
