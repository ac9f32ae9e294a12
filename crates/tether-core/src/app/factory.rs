//! ProxyFactory - 共有コンポーネントの組み立てと proxy の払い出し
//!
//! # 設計原則
//! - 協力者（進捗表示・失敗通知・エラー変換・接続確認）は factory が 1 つずつ持ち、全 proxy で共有する
//! - WorkUnitCache も factory が持つ明示的なコンポーネント（`recycle()` で空にする）
//! - 起動時検証（Fail-fast）: runtime が無い、executor が作れない場合は build() がエラー
//!
//! # 使用例
//! ```ignore
//! let factory = ProxyFactory::builder()
//!     .config(ProxyConfig::from_path("tether.json")?)
//!     .connectivity(probe)
//!     .build()?;
//!
//! let users = factory
//!     .with_id(|id: u64| async move { api.fetch_user(id).await })
//!     .suppress_failure_notice()
//!     .build();
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::cache::WorkUnitCache;
use crate::domain::{ActionParameter, BoxError, Pages};
use crate::error::BuildError;
use crate::impls::{DefaultTranslator, LogNotifier, LogProgress, Scope, SwitchProbe};
use crate::ports::{
    Clock, ConnectivityProbe, ErrorTranslator, FailureNotifier, IdGenerator, ProgressContext, ProgressSink,
    SystemClock, UlidGenerator,
};
use crate::throttle::ThrottlePolicy;
use crate::work::{WorkUnit, WorkUnitFactory};

use super::config::ProxyConfig;
use super::delivery::DeliveryContext;
use super::executor::JobExecutor;
use super::proxy::{NetworkFilter, ProxyOptions, RequestId, RequestProxy};

/// Collaborators shared by every proxy of one factory.
pub(crate) struct Shared {
    pub config: ProxyConfig,
    pub progress: Arc<dyn ProgressSink>,
    pub notifier: Arc<dyn FailureNotifier>,
    pub translator: Arc<dyn ErrorTranslator>,
    pub probe: Arc<dyn ConnectivityProbe>,
    pub cache: Arc<WorkUnitCache>,
    pub delivery: DeliveryContext,
    pub executor: JobExecutor,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
}

/// ProxyFactoryBuilder は ProxyFactory を構築
///
/// 指定しなかった協力者には既定の実装が入ります
/// （LogProgress, LogNotifier, DefaultTranslator, 常時 online の SwitchProbe）。
#[derive(Default)]
pub struct ProxyFactoryBuilder {
    config: ProxyConfig,
    progress: Option<Arc<dyn ProgressSink>>,
    notifier: Option<Arc<dyn FailureNotifier>>,
    translator: Option<Arc<dyn ErrorTranslator>>,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    cache: Option<Arc<WorkUnitCache>>,
    executor: Option<JobExecutor>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl ProxyFactoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ProxyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn progress_sink(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn failure_notifier(mut self, notifier: Arc<dyn FailureNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn error_translator(mut self, translator: Arc<dyn ErrorTranslator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn connectivity(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Share an existing cache (e.g. between factories).
    pub fn cache(mut self, cache: Arc<WorkUnitCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn executor(mut self, executor: JobExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Must be called inside a tokio runtime: the delivery loop runs on it.
    pub fn build(self) -> Result<ProxyFactory, BuildError> {
        let runtime = Handle::try_current()?;
        let executor = match self.executor {
            Some(executor) => executor,
            None => JobExecutor::from_config(&self.config.executor)?,
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(WorkUnitCache::new(self.config.cache_capacity)));
        tracing::debug!(
            cache_capacity = cache.capacity(),
            dedicated_executor = executor.is_dedicated(),
            "proxy factory built"
        );

        Ok(ProxyFactory {
            shared: Arc::new(Shared {
                progress: self.progress.unwrap_or_else(|| Arc::new(LogProgress)),
                notifier: self.notifier.unwrap_or_else(|| Arc::new(LogNotifier)),
                translator: self.translator.unwrap_or_else(|| Arc::new(DefaultTranslator)),
                probe: self.probe.unwrap_or_else(|| Arc::new(SwitchProbe::online())),
                delivery: DeliveryContext::spawn(&runtime),
                config: self.config,
                cache,
                executor,
                clock,
                ids,
            }),
        })
    }
}

/// Hands out proxies wired to one set of collaborators. Cheap to clone.
#[derive(Clone)]
pub struct ProxyFactory {
    shared: Arc<Shared>,
}

impl ProxyFactory {
    pub fn builder() -> ProxyFactoryBuilder {
        ProxyFactoryBuilder::new()
    }

    /// A proxy whose work units come from `factory`.
    pub fn proxy<ID, D, F>(&self, factory: F) -> ProxyBuilder<ID, D>
    where
        ID: RequestId,
        D: Send + 'static,
        F: WorkUnitFactory<ID, D> + 'static,
    {
        ProxyBuilder::new(Arc::clone(&self.shared), Arc::new(factory))
    }

    /// Requests that carry no id.
    pub fn simple<D, F, Fut>(&self, call: F) -> ProxyBuilder<(), D>
    where
        D: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<D, BoxError>> + Send + 'static,
    {
        let call = Arc::new(call);
        let factory: Arc<dyn WorkUnitFactory<(), D>> = Arc::new(move |_: &(), _: &ActionParameter| {
            let call = Arc::clone(&call);
            WorkUnit::from_future((), move |_| call())
        });
        ProxyBuilder::new(Arc::clone(&self.shared), factory)
    }

    /// Requests keyed by id only.
    pub fn with_id<ID, D, F, Fut>(&self, call: F) -> ProxyBuilder<ID, D>
    where
        ID: RequestId,
        D: Send + 'static,
        F: Fn(ID) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<D, BoxError>> + Send + 'static,
    {
        let call = Arc::new(call);
        let factory: Arc<dyn WorkUnitFactory<ID, D>> = Arc::new(move |id: &ID, _: &ActionParameter| {
            let call = Arc::clone(&call);
            WorkUnit::from_future(id.clone(), move |id| call(id))
        });
        ProxyBuilder::new(Arc::clone(&self.shared), factory)
    }

    /// Requests whose source also needs the action.
    pub fn with_action<ID, D, F, Fut>(&self, call: F) -> ProxyBuilder<ID, D>
    where
        ID: RequestId,
        D: Send + 'static,
        F: Fn(ID, ActionParameter) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<D, BoxError>> + Send + 'static,
    {
        let call = Arc::new(call);
        let factory: Arc<dyn WorkUnitFactory<ID, D>> = Arc::new(move |id: &ID, action: &ActionParameter| {
            let call = Arc::clone(&call);
            let action = *action;
            WorkUnit::from_future(id.clone(), move |id| call(id, action))
        });
        ProxyBuilder::new(Arc::clone(&self.shared), factory)
    }

    /// Paged requests. An action without pages starts at `Pages::default()`.
    pub fn paged<ID, D, F, Fut>(&self, call: F) -> ProxyBuilder<ID, D>
    where
        ID: RequestId,
        D: Send + 'static,
        F: Fn(ID, Pages) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<D, BoxError>> + Send + 'static,
    {
        let call = Arc::new(call);
        let factory: Arc<dyn WorkUnitFactory<ID, D>> = Arc::new(move |id: &ID, action: &ActionParameter| {
            let call = Arc::clone(&call);
            let pages = action.pages().unwrap_or_default();
            WorkUnit::paged_future(id.clone(), pages, move |id, pages| call(id, pages))
        });
        ProxyBuilder::new(Arc::clone(&self.shared), factory)
    }

    /// A fresh in-memory scope using this factory's id generator.
    pub fn scope(&self) -> Arc<Scope> {
        Arc::new(Scope::new(Arc::clone(&self.shared.ids)))
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.shared.config
    }

    pub fn cache(&self) -> &Arc<WorkUnitCache> {
        &self.shared.cache
    }

    pub fn delivery(&self) -> &DeliveryContext {
        &self.shared.delivery
    }

    /// Empty the work-unit cache.
    pub fn recycle(&self) {
        self.shared.cache.clear();
    }

    /// Wait until every terminal event posted so far has been delivered.
    pub async fn flush(&self) {
        self.shared.delivery.flush().await;
    }

    /// Deliver what is queued, then stop the delivery loop.
    ///
    /// # Panics
    /// Re-raises a callback panic (such as an unregistered action kind) that
    /// stopped the delivery loop.
    pub async fn shutdown(&self) {
        self.shared.delivery.shutdown().await;
    }
}

/// Per-proxy options. Defaults come from the factory's `ProxyConfig`.
pub struct ProxyBuilder<ID, D> {
    shared: Arc<Shared>,
    factory: Arc<dyn WorkUnitFactory<ID, D>>,
    options: ProxyOptions,
}

impl<ID: RequestId, D: Send + 'static> ProxyBuilder<ID, D> {
    fn new(shared: Arc<Shared>, factory: Arc<dyn WorkUnitFactory<ID, D>>) -> Self {
        let options = ProxyOptions {
            check_network: shared.config.check_network,
            network_filter: None,
            notify_failures: shared.config.failure_notice,
            progress: None,
            throttle: shared.config.throttle.clone(),
        };
        Self {
            shared,
            factory,
            options,
        }
    }

    /// Execute even when the connectivity probe reports offline.
    pub fn skip_network_check(mut self) -> Self {
        self.options.check_network = false;
        self
    }

    /// Check connectivity only for actions `filter` accepts.
    pub fn network_check_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&ActionParameter) -> bool + Send + Sync + 'static,
    {
        let filter: NetworkFilter = Arc::new(filter);
        self.options.network_filter = Some(filter);
        self
    }

    /// Unhandled failures are logged instead of reaching the failure notifier.
    pub fn suppress_failure_notice(mut self) -> Self {
        self.options.notify_failures = false;
        self
    }

    pub fn progress(mut self, context: ProgressContext) -> Self {
        self.options.progress = Some(context);
        self
    }

    pub fn throttle_policy(mut self, policy: ThrottlePolicy) -> Self {
        self.options.throttle = policy;
        self
    }

    pub fn build(self) -> RequestProxy<ID, D> {
        RequestProxy::assemble(self.shared, self.factory, self.options)
    }
}
