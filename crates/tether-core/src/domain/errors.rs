//! Errors - エラー型と分類
//!
//! # 分類
//! - PreconditionFailure: 接続不可（`NetworkUnavailable`）
//! - ThrottleFailure: 直近の失敗が多すぎる（`FailTooMuch`）
//! - TranslatedFailure: ErrorTranslator が正規化したエラー（`Api`）
//! - UnexpectedException: handler 内で発生したエラー（`Unexpected`）
//!
//! ProgrammingError（未登録の ActionKind への dispatch）はエラー値ではなく panic です。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::HandleId;
use super::key::RequestKey;

/// Opaque error produced by a source or a handler.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// ErrorKind は ProxyError の運用分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Precondition,
    Throttle,
    Translated,
    Unexpected,
}

/// A normalized error, as produced by an `ErrorTranslator`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message} (code={code})")]
pub struct ApiError {
    pub code: i32,
    pub message: String,
}

impl ApiError {
    pub const UNKNOWN: i32 = 1001;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Self::UNKNOWN, message)
    }
}

/// The failure half of every terminal outcome delivered to a callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProxyError {
    #[error("network unavailable")]
    NetworkUnavailable,

    #[error("too many recent failures for {key} ({count} failures)")]
    FailTooMuch { key: RequestKey, count: u32 },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("unexpected error in callback: {0}")]
    Unexpected(String),
}

impl ProxyError {
    pub const NETWORK_UNAVAILABLE: i32 = 8001;
    pub const FAIL_TOO_MUCH: i32 = 9999;

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::NetworkUnavailable => ErrorKind::Precondition,
            ProxyError::FailTooMuch { .. } => ErrorKind::Throttle,
            ProxyError::Api(_) => ErrorKind::Translated,
            ProxyError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            ProxyError::NetworkUnavailable => Self::NETWORK_UNAVAILABLE,
            ProxyError::FailTooMuch { .. } => Self::FAIL_TOO_MUCH,
            ProxyError::Api(e) => e.code,
            ProxyError::Unexpected(_) => ApiError::UNKNOWN,
        }
    }

    pub(crate) fn unexpected(err: &BoxError) -> Self {
        ProxyError::Unexpected(err.to_string())
    }
}

/// Failure while achieving (cancelling or acknowledging) handles.
#[derive(Debug, Error)]
pub enum CancelError {
    #[error("failed to achieve {handle}: {reason}")]
    Failed { handle: HandleId, reason: String },

    #[error("{} handle(s) failed to achieve", .0.len())]
    Composite(Vec<CancelError>),
}

impl CancelError {
    /// Number of individual failures this error stands for.
    pub fn failures(&self) -> usize {
        match self {
            CancelError::Failed { .. } => 1,
            CancelError::Composite(errors) => errors.iter().map(CancelError::failures).sum(),
        }
    }
}
