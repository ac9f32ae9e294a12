//! Ports - 抽象化レイヤー
//!
//! proxy の外側にある協力者（進捗表示、失敗通知、エラー変換、接続確認、
//! スコープのライフサイクル）と、時刻・ID 生成のインターフェースです。
//! 実装は `impls` に置きます。

pub mod clock;
pub mod connectivity;
pub mod id_generator;
pub mod notifier;
pub mod progress;
pub mod scope;
pub mod translator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::connectivity::ConnectivityProbe;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::notifier::FailureNotifier;
pub use self::progress::{ProgressContext, ProgressSink};
pub use self::scope::{ScopeObserver, ScopeOwner};
pub use self::translator::ErrorTranslator;
