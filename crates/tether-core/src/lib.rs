//! tether-core
//!
//! 一回きりの非同期処理（ネットワーク呼び出しなど）を、画面などのスコープに
//! 結びついた「重複排除・失敗抑制・一括取消」つきの作業単位に変えるライブラリ。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, action, key, errors）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, ConnectivityProbe, ProgressSink, FailureNotifier, ErrorTranslator, ScopeOwner）
//! - **cancellation** / **throttle** / **cache** / **work**: proxy が組み合わせる部品
//! - **dispatch**: 終端イベントの配送先（Callback, ActionTable, CallbackDispatcher）
//! - **app**: ProxyFactory, RequestProxy, DeliveryContext, JobExecutor
//! - **impls**: ports の既定実装（Scope, SwitchProbe, LogNotifier など）

pub mod domain;
pub mod error;
pub mod ports;

pub mod cache;
pub mod cancellation;
pub mod throttle;
pub mod work;

pub mod app;
pub mod dispatch;
pub mod impls;

pub use crate::app::{ProxyConfig, ProxyFactory, RequestProxy};
pub use crate::dispatch::{ActionTable, Callback};
pub use crate::domain::{ActionKind, ActionParameter, Outcome, Pages, ProxyError};
pub use crate::error::{BuildError, ConfigError};
