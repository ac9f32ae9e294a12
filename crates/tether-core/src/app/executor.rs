//! JobExecutor - WorkUnit を実行する worker スケジューラ
//!
//! - `current()`: 呼び出し元の tokio runtime をそのまま使う
//! - `dedicated()`: 専用の multi-thread runtime を持つ（blocking thread は keep_alive 後に退役）

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::error::BuildError;

/// Settings for a dedicated worker runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Build a dedicated runtime instead of borrowing the caller's.
    pub dedicated: bool,

    /// `None` lets tokio pick (one per core).
    pub worker_threads: Option<usize>,

    /// Idle timeout of the dedicated runtime's blocking-pool threads
    /// (`spawn_blocking`). Async worker threads are a fixed pool sized by
    /// `worker_threads` and never retire, so work units spawned by
    /// `JobExecutor::spawn` are not affected. Ignored unless `dedicated`.
    pub keep_alive_ms: u64,

    pub thread_name: String,
}

impl ExecutorConfig {
    pub const KEEP_ALIVE_MS: u64 = 30_000;

    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            dedicated: false,
            worker_threads: None,
            keep_alive_ms: Self::KEEP_ALIVE_MS,
            thread_name: "tether-worker".to_string(),
        }
    }
}

/// Runtime owned by a dedicated executor; shut down without blocking on drop.
struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

/// Spawns work units. Cheap to clone.
#[derive(Clone)]
pub struct JobExecutor {
    handle: Handle,
    owned: Option<Arc<OwnedRuntime>>,
}

impl JobExecutor {
    /// Use the runtime the caller is running on.
    pub fn current() -> Result<Self, BuildError> {
        Ok(Self::on(Handle::try_current()?))
    }

    pub fn on(handle: Handle) -> Self {
        Self {
            handle,
            owned: None,
        }
    }

    /// Build a runtime owned by this executor (and its clones).
    pub fn dedicated(config: &ExecutorConfig) -> Result<Self, BuildError> {
        let mut builder = Builder::new_multi_thread();
        builder
            .enable_time()
            .thread_name(config.thread_name.clone())
            .thread_keep_alive(config.keep_alive());
        if let Some(threads) = config.worker_threads {
            builder.worker_threads(threads.max(1));
        }
        let runtime = builder.build().map_err(BuildError::Executor)?;
        tracing::debug!(thread_name = %config.thread_name, "dedicated worker runtime started");
        Ok(Self {
            handle: runtime.handle().clone(),
            owned: Some(Arc::new(OwnedRuntime(Some(runtime)))),
        })
    }

    pub fn from_config(config: &ExecutorConfig) -> Result<Self, BuildError> {
        if config.dedicated {
            Self::dedicated(config)
        } else {
            Self::current()
        }
    }

    pub fn is_dedicated(&self) -> bool {
        self.owned.is_some()
    }

    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn current_spawns_on_the_caller_runtime() {
        let executor = JobExecutor::current().unwrap();
        assert!(!executor.is_dedicated());

        let value = executor.spawn(async { 21 * 2 }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn current_without_a_runtime_is_a_build_error() {
        assert!(matches!(JobExecutor::current(), Err(BuildError::NoRuntime(_))));
    }

    #[tokio::test]
    async fn dedicated_runtime_runs_jobs() {
        let config = ExecutorConfig {
            dedicated: true,
            worker_threads: Some(1),
            ..ExecutorConfig::default()
        };
        let executor = JobExecutor::from_config(&config).unwrap();
        assert!(executor.is_dedicated());

        let name = executor
            .spawn(async { std::thread::current().name().map(str::to_string) })
            .await
            .unwrap();
        assert_eq!(name.as_deref(), Some("tether-worker"));
    }
}
