//! Impls - ports の実装（既定値・開発用・テスト用）
//!
//! # 含まれる実装
//! - **Scope**: in-memory の ScopeOwner（destroy 通知つき）
//! - **SwitchProbe**: 手動で切り替える ConnectivityProbe
//! - **LogNotifier** / **LogProgress**: tracing に出すだけの通知・進捗表示
//! - **DefaultTranslator**: ApiError はそのまま、それ以外は UNKNOWN
//!
//! UI 側の本物の実装（toast, dialog など）は利用側のクレートで用意します。

pub mod notifier;
pub mod probe;
pub mod progress;
pub mod scope;
pub mod translator;

pub use self::notifier::LogNotifier;
pub use self::probe::SwitchProbe;
pub use self::progress::LogProgress;
pub use self::scope::Scope;
pub use self::translator::DefaultTranslator;
