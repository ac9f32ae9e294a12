//! 構築時・設定読み込み時のエラー
//!
//! 実行時の失敗（callback に届くもの）は `domain::errors` にあります。
//! ここにあるのは「起動前に分かるべき」エラーです。

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::ActionKind;

/// BuildError は wiring（dispatch table, factory, executor）の構築エラー
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Missing action kinds: {0:?}. These kinds must have a handler.")]
    MissingActionKinds(Vec<ActionKind>),

    #[error("no tokio runtime is running; build the factory inside a runtime")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("failed to build worker runtime: {0}")]
    Executor(#[source] std::io::Error),
}

/// ConfigError は ProxyConfig の読み込みエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
