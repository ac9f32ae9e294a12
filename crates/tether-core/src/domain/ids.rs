//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID + ジェネリック実装
//! Proxy / 取消ハンドル / Scope / Observer をそれぞれ別の型で表します。
//! `Id<T>` の `T` は PhantomData のマーカー型で、実行時のコストはありません。
//!
//! ## ULID の特性
//! - **時刻でソート可能**: ログ上で生成順に並ぶ
//! - **調整なしで生成可能**: ロックやカウンタを共有しなくてよい

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"proxy-", "handle-" など）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// # 例
/// ```ignore
/// let proxy_id: ProxyId = Id::from(Ulid::new());
/// let handle_id: HandleId = Id::from(Ulid::new());
/// // proxy_id と handle_id は異なる型なので、混同できない
/// ```
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Proxy {}

impl IdMarker for Proxy {
    fn prefix() -> &'static str {
        "proxy-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Handle {}

impl IdMarker for Handle {
    fn prefix() -> &'static str {
        "handle-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {}

impl IdMarker for Scope {
    fn prefix() -> &'static str {
        "scope-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Observer {}

impl IdMarker for Observer {
    fn prefix() -> &'static str {
        "observer-"
    }
}

// ========================================
// Type Alias
// ========================================

/// Identifier of a request proxy (appears in every log line it emits).
pub type ProxyId = Id<Proxy>;

/// Identifier of one in-flight request's cancellation handle.
pub type HandleId = Id<Handle>;

/// Identifier of a lifecycle scope.
pub type ScopeId = Id<Scope>;

/// Identifier of a destroy observer registered with a scope.
pub type ObserverId = Id<Observer>;
