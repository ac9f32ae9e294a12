//! App - アプリケーション層
//!
//! ports とコンポーネント（cache, throttle, cancellation, dispatch）を組み合わせて
//! RequestProxy を実装します。
//!
//! # 主要コンポーネント
//! - **ProxyFactory**: 協力者の組み立てと proxy の払い出し
//! - **RequestProxy**: リクエストのオーケストレーション
//! - **RequestHandle**: 実行中リクエストの取消ハンドル
//! - **DeliveryContext**: 終端 callback を実行する FIFO ループ
//! - **JobExecutor**: WorkUnit を実行する worker スケジューラ
//! - **ProxyConfig**: JSON で読める設定

pub mod config;
pub mod delivery;
pub mod executor;
pub mod factory;
pub mod proxy;
pub mod request;

// 主要な型を再エクスポート
pub use self::config::ProxyConfig;
pub use self::delivery::DeliveryContext;
pub use self::executor::{ExecutorConfig, JobExecutor};
pub use self::factory::{ProxyBuilder, ProxyFactory, ProxyFactoryBuilder};
pub use self::proxy::{NetworkFilter, RequestId, RequestProxy};
pub use self::request::RequestHandle;
