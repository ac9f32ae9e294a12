//! DefaultTranslator - source のエラーを ApiError に正規化する
//!
//! source が ApiError をそのまま返していればそれを使い、
//! それ以外は UNKNOWN（1001）にまとめます。エラーを握りつぶすことはありません。

use crate::domain::{ApiError, BoxError};
use crate::ports::ErrorTranslator;

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTranslator;

impl ErrorTranslator for DefaultTranslator {
    fn translate(&self, error: &BoxError) -> Option<ApiError> {
        match error.downcast_ref::<ApiError>() {
            Some(api) => Some(api.clone()),
            None => Some(ApiError::unknown(error.to_string())),
        }
    }
}
