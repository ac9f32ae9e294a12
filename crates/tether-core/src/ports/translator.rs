//! ErrorTranslator port - source のエラーを正規化
//!
//! `None` を返すと、その失敗は callback に届きません（completion は届く）。
//! 呼び出し側が自分で処理したいエラーを握りつぶすための出口です。

use crate::domain::{ApiError, BoxError};

pub trait ErrorTranslator: Send + Sync {
    fn translate(&self, error: &BoxError) -> Option<ApiError>;
}
