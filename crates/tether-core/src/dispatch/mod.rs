//! Dispatch - 終端イベント（success / failure / completion）の配送先
//!
//! - **callback**: proxy に登録する受け口（Outcome handler + completion hook）
//! - **table**: ActionKind ごとの handler 表
//! - **dispatcher**: 登録中の callback へ振り分ける

pub mod callback;
pub mod dispatcher;
pub mod table;

pub use self::callback::{Callback, CallbackMode};
pub use self::dispatcher::CallbackDispatcher;
pub use self::table::{ActionTable, ActionTableBuilder};

use crate::domain::BoxError;

/// Handlers report their own errors; the dispatcher reroutes them.
pub type HandlerResult = Result<(), BoxError>;
