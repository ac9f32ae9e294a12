//! RequestProxy - リクエストの実行・重複排除・抑制・取消をまとめる
//!
//! # 処理の流れ
//! ```text
//! request(action, id)
//!   ├─ destroy 済み → 何もしない
//!   ├─ busy + 進捗表示
//!   ├─ 接続確認 NG → NetworkUnavailable を failure + completion で配送
//!   ├─ throttle 中 → FailTooMuch を同様に配送
//!   └─ cache から WorkUnit を取得（hit なら rebind）→ worker で実行
//!        └─ 終端イベントを DeliveryContext に投入 → callback へ
//! ```
//!
//! # 設計原則
//! - callback は必ず DeliveryContext 上で、投入順に呼ばれる
//! - scope の destroy 後は何も配送しない（エラーも出さない）
//! - 取消は best-effort: 配送待ちのイベントは取消済みかを見てから捨てる

use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use futures_util::StreamExt;
use parking_lot::Mutex;

use crate::cache::Cached;
use crate::cancellation::{Cancellable, CancellationSet};
use crate::dispatch::{Callback, CallbackDispatcher, CallbackMode};
use crate::domain::{ActionParameter, HandleId, ObserverId, ProxyError, ProxyId, RequestKey, ScopeId};
use crate::ports::{ProgressContext, ScopeObserver, ScopeOwner};
use crate::throttle::{ErrorThrottle, ThrottlePolicy};
use crate::work::{WorkUnit, WorkUnitFactory};

use super::factory::Shared;
use super::request::RequestHandle;

/// Bounds every request identity must satisfy.
pub trait RequestId: Clone + Hash + Debug + Send + Sync + 'static {}

impl<T> RequestId for T where T: Clone + Hash + Debug + Send + Sync + 'static {}

/// Decides per request whether connectivity is checked.
pub type NetworkFilter = Arc<dyn Fn(&ActionParameter) -> bool + Send + Sync>;

/// Per-proxy switches, filled in by `ProxyBuilder`.
pub(crate) struct ProxyOptions {
    pub check_network: bool,
    pub network_filter: Option<NetworkFilter>,
    pub notify_failures: bool,
    pub progress: Option<ProgressContext>,
    pub throttle: ThrottlePolicy,
}

/// Orchestrates requests for one data type on behalf of one scope.
///
/// Clones share the same state.
pub struct RequestProxy<ID, D> {
    core: Arc<ProxyCore<ID, D>>,
}

impl<ID, D> Clone for RequestProxy<ID, D> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<ID: RequestId, D: Send + 'static> RequestProxy<ID, D> {
    pub(crate) fn assemble(shared: Arc<Shared>, factory: Arc<dyn WorkUnitFactory<ID, D>>, options: ProxyOptions) -> Self {
        let id = shared.ids.generate_proxy_id();
        let core = ProxyCore {
            id,
            throttle: ErrorThrottle::new(options.throttle, Arc::clone(&shared.clock)),
            dispatcher: CallbackDispatcher::new(Arc::clone(&shared.notifier), options.notify_failures),
            check_network: options.check_network,
            network_filter: options.network_filter,
            factory,
            shared,
            destroyed: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            binding: Mutex::new(Binding {
                cancellation: Arc::new(CancellationSet::new()),
                scope: None,
                progress: options.progress,
                shown: None,
            }),
        };
        tracing::debug!(proxy = %id, "proxy created");
        Self { core: Arc::new(core) }
    }

    pub fn id(&self) -> ProxyId {
        self.core.id
    }

    /// Run the request for `(action, id)`.
    ///
    /// Returns the handle id when a work unit was started, `None` when the
    /// request was dropped (destroyed proxy) or answered without running
    /// (precondition or throttle failure).
    pub fn request(&self, action: ActionParameter, id: ID) -> Option<HandleId> {
        self.core.request(action, id)
    }

    /// `request(ActionParameter::load(), id)`
    pub fn load(&self, id: ID) -> Option<HandleId> {
        self.request(ActionParameter::load(), id)
    }

    /// Bind to `scope` with `callback`. A destroyed scope destroys the proxy.
    pub fn bind(&self, scope: Arc<dyn ScopeOwner>, callback: impl Into<Arc<Callback<ID, D>>>) {
        self.core.bind(scope, callback.into());
    }

    /// Install a callback with no scope attached.
    pub fn set_callback(&self, callback: impl Into<Arc<Callback<ID, D>>>) {
        if self.core.is_destroyed() {
            tracing::debug!(proxy = %self.core.id, "set_callback ignored: proxy destroyed");
            return;
        }
        self.core.dispatcher.install(callback.into());
    }

    /// Drop the callback and cancel everything in flight. Never fails.
    pub fn unbind(&self) {
        self.core.unbind();
    }

    /// Where progress is shown, and with which text.
    ///
    /// Takes effect from the next time progress is shown; an indicator that
    /// is already up is hidden on the context it was shown on.
    pub fn progress(&self, context: ProgressContext) {
        self.core.binding.lock().progress = Some(context);
    }

    pub fn is_working(&self) -> bool {
        self.core.in_flight.load(Ordering::Acquire) > 0
    }

    pub fn is_bound(&self) -> bool {
        self.core.dispatcher.is_bound()
    }

    pub fn is_destroyed(&self) -> bool {
        self.core.is_destroyed()
    }

    /// Handles currently tracked for cancellation.
    pub fn pending_handles(&self) -> usize {
        self.core.binding.lock().cancellation.len()
    }

    /// Failures recorded for `(action, id)` in the current window.
    pub fn failures(&self, action: &ActionParameter, id: &ID) -> u32 {
        self.core.throttle.failures(RequestKey::derive(id, action))
    }

    pub fn scope_id(&self) -> Option<ScopeId> {
        self.core
            .binding
            .lock()
            .scope
            .as_ref()
            .map(|registration| registration.owner.scope_id())
    }
}

impl<ID, D> fmt::Debug for RequestProxy<ID, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestProxy")
            .field("id", &self.core.id)
            .field("in_flight", &self.core.in_flight.load(Ordering::Acquire))
            .field("destroyed", &self.core.destroyed.load(Ordering::Acquire))
            .finish()
    }
}

struct ScopeRegistration {
    owner: Arc<dyn ScopeOwner>,
    observer: ObserverId,
}

struct Binding {
    cancellation: Arc<CancellationSet>,
    scope: Option<ScopeRegistration>,
    progress: Option<ProgressContext>,
    /// Context `show` was called on; the matching `hide` uses it.
    shown: Option<ProgressContext>,
}

struct ProxyCore<ID, D> {
    id: ProxyId,
    shared: Arc<Shared>,
    factory: Arc<dyn WorkUnitFactory<ID, D>>,
    check_network: bool,
    network_filter: Option<NetworkFilter>,
    throttle: ErrorThrottle,
    dispatcher: CallbackDispatcher<ID, D>,
    destroyed: AtomicBool,
    in_flight: AtomicUsize,
    binding: Mutex<Binding>,
}

impl<ID: RequestId, D: Send + 'static> ProxyCore<ID, D> {
    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn request(self: &Arc<Self>, action: ActionParameter, id: ID) -> Option<HandleId> {
        if self.is_destroyed() {
            tracing::debug!(proxy = %self.id, ?id, "request ignored: proxy destroyed");
            return None;
        }
        let key = RequestKey::derive(&id, &action);
        self.begin();

        if self.needs_network_check(&action) && !self.shared.probe.is_available() {
            tracing::debug!(proxy = %self.id, %key, "network unavailable; not executed");
            self.post_synthesized(id, action, ProxyError::NetworkUnavailable);
            return None;
        }
        if self.throttle.is_throttled(key) {
            let count = self.throttle.failures(key);
            tracing::warn!(proxy = %self.id, %key, count, "too many recent failures; not executed");
            self.post_synthesized(id, action, ProxyError::FailTooMuch { key, count });
            return None;
        }
        Some(self.execute(key, action, id))
    }

    fn needs_network_check(&self, action: &ActionParameter) -> bool {
        self.check_network && self.network_filter.as_ref().is_none_or(|filter| filter(action))
    }

    fn execute(self: &Arc<Self>, key: RequestKey, action: ActionParameter, id: ID) -> HandleId {
        let unit = self.unit_for(key, &id, &action);

        let handle_id = self.shared.ids.generate_handle_id();
        let weak = Arc::downgrade(self);
        let handle = Arc::new(RequestHandle::new(handle_id, move || {
            if let Some(core) = weak.upgrade() {
                core.settle();
            }
        }));
        let cancellation = Arc::clone(&self.binding.lock().cancellation);
        cancellation.add(handle.clone());

        let task = self.shared.executor.spawn(run_unit(
            Arc::clone(self),
            unit,
            key,
            action,
            id,
            Arc::clone(&handle),
            cancellation,
        ));
        handle.attach(task.abort_handle());
        tracing::debug!(proxy = %self.id, handle = %handle_id, %key, "request started");
        handle_id
    }

    fn unit_for(&self, key: RequestKey, id: &ID, action: &ActionParameter) -> Arc<WorkUnit<ID, D>> {
        match self
            .shared
            .cache
            .get_or_create(key, || self.factory.create(id, action))
        {
            Cached::Hit(unit) => {
                tracing::trace!(proxy = %self.id, %key, "work unit reused");
                unit.rebind(id.clone());
                unit
            }
            Cached::Created(unit) => unit,
        }
    }

    fn begin(&self) {
        if self.in_flight.fetch_add(1, Ordering::AcqRel) == 0 {
            let progress = {
                let mut binding = self.binding.lock();
                binding.shown = binding.progress.clone();
                binding.shown.clone()
            };
            if let Some(progress) = progress {
                self.shared.progress.show(&progress);
            }
        }
    }

    /// One request is over (completed or cancelled).
    fn settle(&self) {
        let previous = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if previous == Ok(1) && !self.is_destroyed() {
            let progress = self.binding.lock().shown.take();
            if let Some(progress) = progress {
                self.shared.progress.hide(&progress);
            }
        }
    }

    /// Failure + completion for a request that never ran.
    fn post_synthesized(self: &Arc<Self>, id: ID, action: ActionParameter, error: ProxyError) {
        let core = Arc::clone(self);
        let posted = self.shared.delivery.post(move || {
            core.dispatcher.on_failure(&id, action, error, core.is_destroyed());
            core.complete(&id, action);
        });
        if !posted {
            self.settle();
        }
    }

    fn post_success(self: &Arc<Self>, handle: &Arc<RequestHandle>, id: ID, action: ActionParameter, data: D) {
        let core = Arc::clone(self);
        let handle = Arc::clone(handle);
        self.shared.delivery.post(move || {
            if handle.is_cancelled() {
                return;
            }
            core.dispatcher.on_success(&id, action, data, core.is_destroyed());
        });
    }

    fn post_failure(self: &Arc<Self>, handle: &Arc<RequestHandle>, id: ID, action: ActionParameter, error: ProxyError) {
        let core = Arc::clone(self);
        let handle = Arc::clone(handle);
        self.shared.delivery.post(move || {
            if handle.is_cancelled() {
                return;
            }
            core.dispatcher.on_failure(&id, action, error, core.is_destroyed());
        });
    }

    fn post_completion(
        self: &Arc<Self>,
        handle: Arc<RequestHandle>,
        cancellation: Arc<CancellationSet>,
        id: ID,
        action: ActionParameter,
    ) {
        let core = Arc::clone(self);
        let job_handle = Arc::clone(&handle);
        let posted = self.shared.delivery.post(move || {
            if !job_handle.finish() {
                return;
            }
            // finish 済みなので remove 内の achieve は acknowledge になる
            if let Err(e) = cancellation.remove(job_handle.as_ref()) {
                tracing::warn!(handle = %job_handle.handle_id(), error = %e, "failed to release handle");
            }
            core.complete(&id, action);
        });
        if !posted && handle.finish() {
            self.settle();
        }
    }

    fn complete(&self, id: &ID, action: ActionParameter) {
        let mode = self.dispatcher.on_complete(id, action);
        self.settle();
        if mode == Some(CallbackMode::OneShot) {
            self.unbind();
        }
    }

    fn bind(self: &Arc<Self>, scope: Arc<dyn ScopeOwner>, callback: Arc<Callback<ID, D>>) {
        if self.is_destroyed() {
            tracing::debug!(proxy = %self.id, "bind ignored: proxy destroyed");
            return;
        }
        if scope.is_destroyed() {
            tracing::debug!(proxy = %self.id, scope = %scope.scope_id(), "bound to a destroyed scope");
            self.destroyed.store(true, Ordering::Release);
            return;
        }

        let replaced = self
            .dispatcher
            .current()
            .is_some_and(|current| !Arc::ptr_eq(&current, &callback));
        let (retired, rebind_scope) = {
            let mut binding = self.binding.lock();
            let retired = replaced.then(|| {
                std::mem::replace(&mut binding.cancellation, Arc::new(CancellationSet::new()))
            });
            let rebind_scope = binding
                .scope
                .as_ref()
                .is_none_or(|registration| registration.owner.scope_id() != scope.scope_id());
            (retired, rebind_scope)
        };
        self.dispatcher.install(callback);
        if let Some(retired) = retired {
            if let Err(e) = retired.achieve() {
                tracing::warn!(proxy = %self.id, failures = e.failures(), "failed to cancel work of the replaced callback");
            }
        }

        if rebind_scope {
            let observer = Arc::new(DestroyObserver {
                core: Arc::downgrade(self),
            });
            let observer = scope.add_observer(observer);
            let previous = self.binding.lock().scope.replace(ScopeRegistration {
                owner: Arc::clone(&scope),
                observer,
            });
            if let Some(previous) = previous {
                previous.owner.remove_observer(previous.observer);
            }
        }
        tracing::debug!(proxy = %self.id, scope = %scope.scope_id(), "proxy bound");
    }

    fn unbind(&self) {
        self.dispatcher.clear();
        let cancellation = Arc::clone(&self.binding.lock().cancellation);
        if let Err(e) = cancellation.clear() {
            tracing::warn!(proxy = %self.id, failures = e.failures(), "failed to cancel pending work on unbind");
        }
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let (progress, registration, cancellation) = {
            let mut binding = self.binding.lock();
            (
                binding.shown.take(),
                binding.scope.take(),
                Arc::clone(&binding.cancellation),
            )
        };
        if let Some(progress) = progress {
            if self.in_flight.load(Ordering::Acquire) > 0 {
                self.shared.progress.hide(&progress);
            }
        }
        self.dispatcher.clear();
        if let Err(e) = cancellation.achieve() {
            tracing::warn!(proxy = %self.id, failures = e.failures(), "failed to cancel pending work on destroy");
        }
        if let Some(registration) = registration {
            registration.owner.remove_observer(registration.observer);
        }
        tracing::debug!(proxy = %self.id, "proxy destroyed");
    }
}

/// Consume one execution of `unit` and post its terminal events.
///
/// The first value is the success payload; later values are ignored. An
/// error ends the stream. Completion always follows.
async fn run_unit<ID: RequestId, D: Send + 'static>(
    core: Arc<ProxyCore<ID, D>>,
    unit: Arc<WorkUnit<ID, D>>,
    key: RequestKey,
    action: ActionParameter,
    id: ID,
    handle: Arc<RequestHandle>,
    cancellation: Arc<CancellationSet>,
) {
    let mut results = unit.stream();
    let mut delivered = false;
    while let Some(item) = results.next().await {
        match item {
            Ok(data) if !delivered => {
                delivered = true;
                core.post_success(&handle, id.clone(), action, data);
            }
            Ok(_) => {
                tracing::trace!(proxy = %core.id, %key, "extra value ignored");
            }
            Err(error) => {
                let count = core.throttle.record_failure(key);
                tracing::debug!(proxy = %core.id, %key, count, error = %error, "source failed");
                match core.shared.translator.translate(&error) {
                    Some(api) => core.post_failure(&handle, id.clone(), action, ProxyError::Api(api)),
                    None => tracing::debug!(proxy = %core.id, %key, "failure swallowed by translator"),
                }
                break;
            }
        }
    }
    core.post_completion(handle, cancellation, id, action);
}

struct DestroyObserver<ID, D> {
    core: Weak<ProxyCore<ID, D>>,
}

impl<ID: RequestId, D: Send + 'static> ScopeObserver for DestroyObserver<ID, D> {
    fn on_destroy(&self, scope: ScopeId) {
        if let Some(core) = self.core.upgrade() {
            tracing::debug!(proxy = %core.id, %scope, "scope destroyed");
            core.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    use chrono::{Duration, TimeZone, Utc};
    use futures_util::stream;
    use tokio::sync::{Semaphore, mpsc, oneshot};
    use tokio::time::timeout;

    use crate::app::{ProxyBuilder, ProxyFactory, ProxyFactoryBuilder};
    use crate::dispatch::ActionTable;
    use crate::domain::{ActionKind, ApiError, BoxError, Outcome};
    use crate::impls::SwitchProbe;
    use crate::ports::{ErrorTranslator, FailureNotifier, FixedClock, ProgressSink};

    #[derive(Debug, PartialEq)]
    enum Event {
        Success(u32, String),
        Failure(u32, ProxyError),
        Complete(u32),
    }

    type Events = mpsc::UnboundedReceiver<Event>;

    /// Replies handed out to executions in the order they start.
    type Replies = Arc<Mutex<VecDeque<oneshot::Receiver<String>>>>;

    #[derive(Default)]
    struct Notices(Mutex<Vec<ProxyError>>);

    impl FailureNotifier for Notices {
        fn notify(&self, error: &ProxyError) {
            self.0.lock().push(error.clone());
        }
    }

    #[derive(Default)]
    struct Progress(Mutex<Vec<(&'static str, String)>>);

    impl Progress {
        fn calls(&self) -> Vec<&'static str> {
            self.0.lock().iter().map(|(call, _)| *call).collect()
        }
    }

    impl ProgressSink for Progress {
        fn show(&self, context: &ProgressContext) {
            self.0.lock().push(("show", context.text.clone()));
        }

        fn hide(&self, context: &ProgressContext) {
            self.0.lock().push(("hide", context.text.clone()));
        }
    }

    struct Swallow;

    impl ErrorTranslator for Swallow {
        fn translate(&self, _: &BoxError) -> Option<ApiError> {
            None
        }
    }

    struct Harness {
        factory: ProxyFactory,
        probe: Arc<SwitchProbe>,
        clock: Arc<FixedClock>,
        notices: Arc<Notices>,
        progress: Arc<Progress>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with(|builder| builder)
        }

        fn with(configure: impl FnOnce(ProxyFactoryBuilder) -> ProxyFactoryBuilder) -> Self {
            let probe = Arc::new(SwitchProbe::online());
            let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
            let notices = Arc::new(Notices::default());
            let progress = Arc::new(Progress::default());
            let builder = ProxyFactory::builder()
                .connectivity(probe.clone())
                .clock(clock.clone())
                .failure_notifier(notices.clone())
                .progress_sink(progress.clone());
            Self {
                factory: configure(builder).build().unwrap(),
                probe,
                clock,
                notices,
                progress,
            }
        }

        fn users(&self, creations: &Arc<AtomicUsize>, runs: &Arc<AtomicUsize>) -> ProxyBuilder<u32, String> {
            let creations = Arc::clone(creations);
            let runs = Arc::clone(runs);
            self.factory.proxy(move |id: &u32, _: &ActionParameter| {
                creations.fetch_add(1, Ordering::SeqCst);
                let runs = Arc::clone(&runs);
                WorkUnit::from_future(*id, move |id| {
                    runs.fetch_add(1, Ordering::SeqCst);
                    async move { Ok::<_, BoxError>(format!("user-{id}")) }
                })
            })
        }

        fn failing(&self, runs: &Arc<AtomicUsize>) -> ProxyBuilder<u32, String> {
            let runs = Arc::clone(runs);
            self.factory.proxy(move |id: &u32, _: &ActionParameter| {
                let runs = Arc::clone(&runs);
                WorkUnit::from_future(*id, move |_| {
                    runs.fetch_add(1, Ordering::SeqCst);
                    async { Err::<String, BoxError>("boom".into()) }
                })
            })
        }

        fn replying(&self, creations: &Arc<AtomicUsize>, replies: &Replies) -> ProxyBuilder<u32, String> {
            let creations = Arc::clone(creations);
            let replies = Arc::clone(replies);
            self.factory.proxy(move |id: &u32, _: &ActionParameter| {
                creations.fetch_add(1, Ordering::SeqCst);
                let replies = Arc::clone(&replies);
                WorkUnit::from_future(*id, move |_| {
                    let reply = replies.lock().pop_front();
                    async move {
                        let reply = reply.ok_or("no reply queued")?;
                        Ok::<_, BoxError>(reply.await?)
                    }
                })
            })
        }

        fn gated(&self, gate: &Arc<Semaphore>) -> ProxyBuilder<u32, String> {
            let gate = Arc::clone(gate);
            self.factory.proxy(move |id: &u32, _: &ActionParameter| {
                let gate = Arc::clone(&gate);
                WorkUnit::from_future(*id, move |id| {
                    let gate = Arc::clone(&gate);
                    async move {
                        let _permit = gate.acquire().await?;
                        Ok::<_, BoxError>(format!("user-{id}"))
                    }
                })
            })
        }
    }

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn count(counter: &Arc<AtomicUsize>) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn recorder() -> (Callback<u32, String>, Events) {
        let (tx, rx) = mpsc::unbounded_channel();
        let done = tx.clone();
        let callback = Callback::new(move |id: &u32, _, outcome: Outcome<String>| {
            let event = match outcome {
                Ok(data) => Event::Success(*id, data),
                Err(e) => Event::Failure(*id, e),
            };
            let _ = tx.send(event);
            Ok(())
        })
        .on_complete(move |id: &u32, _| {
            let _ = done.send(Event::Complete(*id));
        });
        (callback, rx)
    }

    async fn next(events: &mut Events) -> Event {
        timeout(StdDuration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    async fn settle(h: &Harness) {
        tokio::task::yield_now().await;
        h.factory.flush().await;
    }

    #[tokio::test]
    async fn one_shot_callback_unbinds_after_completion() {
        let h = Harness::new();
        let proxy = h.users(&counter(), &counter()).build();
        let (callback, mut events) = recorder();

        proxy.bind(h.factory.scope(), callback.once());
        assert!(proxy.is_bound());
        assert!(proxy.load(1).is_some());

        assert_eq!(next(&mut events).await, Event::Success(1, "user-1".into()));
        assert_eq!(next(&mut events).await, Event::Complete(1));
        h.factory.flush().await;

        assert!(!proxy.is_bound());
        assert!(!proxy.is_working());
        assert_eq!(proxy.pending_handles(), 0);
    }

    #[tokio::test]
    async fn persistent_callback_survives_cycles_and_toggles_progress() {
        let h = Harness::new();
        let scope = h.factory.scope();
        let proxy = h
            .users(&counter(), &counter())
            .progress(ProgressContext::with_default_text(scope.scope_id()))
            .build();
        let (callback, mut events) = recorder();
        proxy.bind(scope.clone(), callback);

        for id in [1, 2] {
            proxy.load(id);
            assert_eq!(next(&mut events).await, Event::Success(id, format!("user-{id}")));
            assert_eq!(next(&mut events).await, Event::Complete(id));
            h.factory.flush().await;
        }

        assert!(proxy.is_bound());
        assert_eq!(proxy.scope_id(), Some(scope.scope_id()));
        assert_eq!(h.progress.calls(), vec!["show", "hide", "show", "hide"]);
    }

    #[tokio::test]
    async fn offline_requests_fail_before_anything_runs() {
        let h = Harness::new();
        h.probe.set_available(false);
        let (creations, runs) = (counter(), counter());
        let proxy = h.users(&creations, &runs).build();
        let (callback, mut events) = recorder();
        proxy.set_callback(callback);

        assert!(proxy.load(1).is_none());

        assert_eq!(next(&mut events).await, Event::Failure(1, ProxyError::NetworkUnavailable));
        assert_eq!(next(&mut events).await, Event::Complete(1));
        assert_eq!(count(&creations), 0);
        assert_eq!(count(&runs), 0);
    }

    #[tokio::test]
    async fn network_check_can_be_skipped_or_filtered() {
        let h = Harness::new();
        h.probe.set_available(false);
        let runs = counter();

        let offline_ok = h.users(&counter(), &runs).skip_network_check().build();
        let (callback, mut events) = recorder();
        offline_ok.set_callback(callback);
        assert!(offline_ok.load(1).is_some());
        assert_eq!(next(&mut events).await, Event::Success(1, "user-1".into()));
        assert_eq!(next(&mut events).await, Event::Complete(1));

        let filtered = h
            .users(&counter(), &runs)
            .network_check_filter(|action| action.kind() != ActionKind::AutoRefresh)
            .build();
        let (callback, mut events) = recorder();
        filtered.set_callback(callback);

        assert!(filtered.request(ActionParameter::new(ActionKind::AutoRefresh), 2).is_some());
        assert_eq!(next(&mut events).await, Event::Success(2, "user-2".into()));
        assert_eq!(next(&mut events).await, Event::Complete(2));

        assert!(filtered.request(ActionParameter::new(ActionKind::Refresh), 2).is_none());
        assert_eq!(next(&mut events).await, Event::Failure(2, ProxyError::NetworkUnavailable));
        assert_eq!(count(&runs), 2);
    }

    #[tokio::test]
    async fn ninth_failure_throttles_until_the_window_elapses() {
        let h = Harness::new();
        let runs = counter();
        let proxy = h.failing(&runs).build();
        let (callback, mut events) = recorder();
        proxy.set_callback(callback);
        let boom = ProxyError::Api(ApiError::unknown("boom"));

        for _ in 0..9 {
            assert!(proxy.load(1).is_some());
            assert_eq!(next(&mut events).await, Event::Failure(1, boom.clone()));
            assert_eq!(next(&mut events).await, Event::Complete(1));
        }
        assert_eq!(proxy.failures(&ActionParameter::load(), &1), 9);

        assert!(proxy.load(1).is_none());
        let key = RequestKey::derive(&1u32, &ActionParameter::load());
        assert_eq!(
            next(&mut events).await,
            Event::Failure(1, ProxyError::FailTooMuch { key, count: 9 })
        );
        assert_eq!(next(&mut events).await, Event::Complete(1));
        assert_eq!(count(&runs), 9);

        // other keys are not affected
        assert!(proxy.load(2).is_some());
        assert_eq!(next(&mut events).await, Event::Failure(2, boom.clone()));
        assert_eq!(next(&mut events).await, Event::Complete(2));

        h.clock.advance(Duration::milliseconds(120_000));
        assert!(proxy.load(1).is_some());
        assert_eq!(next(&mut events).await, Event::Failure(1, boom));
        assert_eq!(next(&mut events).await, Event::Complete(1));
        assert_eq!(count(&runs), 11);
        assert_eq!(proxy.failures(&ActionParameter::load(), &1), 1);
        assert!(h.notices.0.lock().is_empty());
    }

    #[tokio::test]
    async fn identical_requests_reuse_one_work_unit_until_evicted() {
        let h = Harness::new();
        let (creations, runs) = (counter(), counter());
        let proxy = h.users(&creations, &runs).build();
        let (callback, mut events) = recorder();
        proxy.set_callback(callback);

        for id in [1, 1, 2, 3, 4, 5, 6, 1] {
            proxy.load(id);
            assert_eq!(next(&mut events).await, Event::Success(id, format!("user-{id}")));
            assert_eq!(next(&mut events).await, Event::Complete(id));
        }
        // 1 は 6 の挿入で追い出され、最後に作り直される
        assert_eq!(count(&creations), 7);
        assert_eq!(count(&runs), 8);
        assert_eq!(h.factory.cache().len(), 5);

        h.factory.recycle();
        proxy.load(6);
        assert_eq!(next(&mut events).await, Event::Success(6, "user-6".into()));
        assert_eq!(count(&creations), 8);
    }

    #[tokio::test]
    async fn concurrent_identical_requests_dispatch_in_completion_order() {
        let h = Harness::new();
        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();
        let replies: Replies = Arc::new(Mutex::new(VecDeque::from([first_rx, second_rx])));
        let creations = counter();
        let proxy = h.replying(&creations, &replies).build();
        let (callback, mut events) = recorder();
        proxy.bind(h.factory.scope(), callback);

        let first = proxy.load(1).unwrap();
        let second = proxy.load(1).unwrap();
        assert_ne!(first, second);
        assert_eq!(proxy.pending_handles(), 2);
        assert_eq!(count(&creations), 1);
        assert_eq!(h.factory.cache().len(), 1);

        // 後から始まった方が先に終わる
        second_tx.send("late".to_string()).unwrap();
        assert_eq!(next(&mut events).await, Event::Success(1, "late".into()));
        assert_eq!(next(&mut events).await, Event::Complete(1));
        h.factory.flush().await;
        assert_eq!(proxy.pending_handles(), 1);
        assert!(proxy.is_working());
        assert!(events.try_recv().is_err());

        first_tx.send("early".to_string()).unwrap();
        assert_eq!(next(&mut events).await, Event::Success(1, "early".into()));
        assert_eq!(next(&mut events).await, Event::Complete(1));
        h.factory.flush().await;

        assert_eq!(proxy.pending_handles(), 0);
        assert!(!proxy.is_working());
    }

    #[tokio::test]
    async fn progress_is_hidden_where_it_was_shown() {
        let h = Harness::new();
        let scope = h.factory.scope();
        let gate = Arc::new(Semaphore::new(0));
        let proxy = h
            .gated(&gate)
            .progress(ProgressContext::new(scope.scope_id(), "loading"))
            .build();
        let (callback, mut events) = recorder();
        proxy.bind(scope.clone(), callback);

        proxy.load(1);
        proxy.progress(ProgressContext::new(scope.scope_id(), "refreshing"));
        gate.add_permits(1);
        assert_eq!(next(&mut events).await, Event::Success(1, "user-1".into()));
        assert_eq!(next(&mut events).await, Event::Complete(1));

        proxy.load(2);
        assert_eq!(next(&mut events).await, Event::Success(2, "user-2".into()));
        assert_eq!(next(&mut events).await, Event::Complete(2));
        h.factory.flush().await;

        let call = |name: &'static str, text: &str| (name, text.to_string());
        assert_eq!(
            *h.progress.0.lock(),
            vec![
                call("show", "loading"),
                call("hide", "loading"),
                call("show", "refreshing"),
                call("hide", "refreshing"),
            ]
        );
    }

    #[tokio::test]
    async fn destroying_the_scope_mid_flight_cancels_quietly() {
        let h = Harness::new();
        let scope = h.factory.scope();
        let gate = Arc::new(Semaphore::new(0));
        let proxy = h
            .gated(&gate)
            .progress(ProgressContext::with_default_text(scope.scope_id()))
            .build();
        let (callback, mut events) = recorder();
        proxy.bind(scope.clone(), callback);

        proxy.load(1);
        proxy.load(2);
        assert_eq!(proxy.pending_handles(), 2);

        scope.destroy();

        assert!(proxy.is_destroyed());
        assert!(!proxy.is_bound());
        assert!(!proxy.is_working());
        assert_eq!(proxy.pending_handles(), 0);
        assert_eq!(scope.observer_count(), 0);

        gate.add_permits(2);
        settle(&h).await;

        assert!(events.try_recv().is_err());
        assert!(h.notices.0.lock().is_empty());
        assert_eq!(h.progress.calls(), vec!["show", "hide"]);
        assert!(proxy.load(3).is_none());
    }

    #[tokio::test]
    async fn unbind_is_idempotent_and_destroy_after_it_is_quiet() {
        let h = Harness::new();
        let scope = h.factory.scope();
        let gate = Arc::new(Semaphore::new(0));
        let proxy = h.gated(&gate).build();
        let (callback, mut events) = recorder();
        proxy.bind(scope.clone(), callback);
        proxy.load(1);

        proxy.unbind();
        proxy.unbind();

        assert!(!proxy.is_bound());
        assert!(!proxy.is_working());
        assert_eq!(proxy.pending_handles(), 0);

        scope.destroy();
        gate.add_permits(1);
        settle(&h).await;

        assert!(proxy.is_destroyed());
        assert!(events.try_recv().is_err());
        assert!(h.notices.0.lock().is_empty());
    }

    #[tokio::test]
    async fn binding_to_a_destroyed_scope_destroys_the_proxy() {
        let h = Harness::new();
        let scope = h.factory.scope();
        scope.destroy();
        let runs = counter();
        let proxy = h.users(&counter(), &runs).build();
        let (callback, _events) = recorder();

        proxy.bind(scope.clone(), callback);

        assert!(proxy.is_destroyed());
        assert!(!proxy.is_bound());
        assert!(proxy.load(1).is_none());
        settle(&h).await;
        assert_eq!(count(&runs), 0);
    }

    #[tokio::test]
    async fn rebinding_with_another_callback_cancels_the_old_work() {
        let h = Harness::new();
        let scope = h.factory.scope();
        let gate = Arc::new(Semaphore::new(0));
        let proxy = h.gated(&gate).build();

        let (first, mut first_events) = recorder();
        let first = Arc::new(first);
        proxy.bind(scope.clone(), Arc::clone(&first));
        proxy.load(1);

        // 同じ callback での再 bind は進行中の作業を残す
        proxy.bind(scope.clone(), Arc::clone(&first));
        assert_eq!(proxy.pending_handles(), 1);

        let (second, mut second_events) = recorder();
        proxy.bind(scope.clone(), second);
        assert_eq!(proxy.pending_handles(), 0);
        assert_eq!(scope.observer_count(), 1);

        gate.add_permits(2);
        settle(&h).await;
        assert!(first_events.try_recv().is_err());
        assert!(second_events.try_recv().is_err());

        proxy.load(2);
        assert_eq!(next(&mut second_events).await, Event::Success(2, "user-2".into()));
        assert_eq!(next(&mut second_events).await, Event::Complete(2));
    }

    #[tokio::test]
    async fn translator_can_swallow_a_failure() {
        let h = Harness::with(|builder| builder.error_translator(Arc::new(Swallow)));
        let proxy = h.failing(&counter()).build();
        let (callback, mut events) = recorder();
        proxy.set_callback(callback);

        proxy.load(1);

        assert_eq!(next(&mut events).await, Event::Complete(1));
        assert_eq!(proxy.failures(&ActionParameter::load(), &1), 1);
        assert!(h.notices.0.lock().is_empty());
    }

    #[tokio::test]
    async fn unhandled_failures_reach_the_notifier_unless_suppressed() {
        let h = Harness::new();
        let (tx, mut events) = mpsc::unbounded_channel();
        let success_only = |tx: mpsc::UnboundedSender<Event>| {
            Callback::success(|_: &u32, _, _: String| Ok(())).on_complete(move |id: &u32, _| {
                let _ = tx.send(Event::Complete(*id));
            })
        };

        let loud = h.failing(&counter()).build();
        loud.set_callback(success_only(tx.clone()));
        loud.load(1);
        assert_eq!(next(&mut events).await, Event::Complete(1));
        assert_eq!(*h.notices.0.lock(), vec![ProxyError::Api(ApiError::unknown("boom"))]);

        let quiet = h.failing(&counter()).suppress_failure_notice().build();
        quiet.set_callback(success_only(tx));
        quiet.load(2);
        assert_eq!(next(&mut events).await, Event::Complete(2));
        assert_eq!(h.notices.0.lock().len(), 1);
    }

    #[tokio::test]
    async fn action_table_routes_by_kind() {
        let h = Harness::new();
        let proxy = h
            .factory
            .with_action(|id: u32, action: ActionParameter| async move {
                Ok::<_, BoxError>(format!("{id}:{:?}", action.kind()))
            })
            .build();
        let (tx, mut events) = mpsc::unbounded_channel();
        let route = |name: &'static str| {
            let tx = tx.clone();
            move |id: &u32, _: ActionParameter, outcome: Outcome<String>| {
                let data = outcome.map_err(|e| Box::new(e) as BoxError)?;
                let _ = tx.send(Event::Success(*id, format!("{name}/{data}")));
                Ok(())
            }
        };
        let table = ActionTable::builder()
            .on_load(route("load"))
            .on_retry(route("retry"))
            .on_refresh(route("refresh"))
            .build()
            .unwrap();
        proxy.set_callback(Callback::actions(table));

        proxy.request(ActionParameter::new(ActionKind::Retry), 1);
        assert_eq!(next(&mut events).await, Event::Success(1, "retry/1:Retry".into()));
        proxy.request(ActionParameter::new(ActionKind::AutoRefresh), 1);
        assert_eq!(next(&mut events).await, Event::Success(1, "refresh/1:AutoRefresh".into()));
    }

    #[tokio::test]
    async fn unregistered_action_kind_stops_delivery_for_good() {
        let h = Harness::new();
        let proxy = h
            .factory
            .with_action(|id: u32, _: ActionParameter| async move { Ok::<_, BoxError>(format!("user-{id}")) })
            .build();
        let (tx, mut events) = mpsc::unbounded_channel();
        let handler = {
            let tx = tx.clone();
            move |id: &u32, _: ActionParameter, outcome: Outcome<String>| {
                if let Ok(data) = outcome {
                    let _ = tx.send(Event::Success(*id, data));
                }
                Ok::<(), BoxError>(())
            }
        };
        let table = ActionTable::builder()
            .on_load(handler.clone())
            .on_retry(handler.clone())
            .on_refresh(handler)
            .build()
            .unwrap();
        proxy.set_callback(Callback::actions(table).on_complete(move |id: &u32, _| {
            let _ = tx.send(Event::Complete(*id));
        }));

        proxy.request(ActionParameter::new(ActionKind::LoadMore), 1);
        timeout(StdDuration::from_secs(5), async {
            while h.factory.delivery().post(|| {}) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("delivery loop kept running");

        let factory = h.factory.clone();
        let stopped = tokio::spawn(async move { factory.shutdown().await }).await;
        let payload = stopped.unwrap_err().into_panic();
        let message = payload.downcast_ref::<String>().cloned().unwrap_or_default();
        assert!(message.contains("LoadMore"), "{message}");

        // 以降のリクエストにも何も配送されない
        assert!(proxy.load(2).is_some());
        settle(&h).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn only_the_first_value_of_a_stream_is_delivered() {
        let h = Harness::new();
        let proxy = h
            .factory
            .proxy(|id: &u32, _: &ActionParameter| {
                WorkUnit::new(*id, |id| {
                    stream::iter(vec![Ok::<_, BoxError>(format!("a{id}")), Ok(format!("b{id}"))]).boxed()
                })
            })
            .build();
        let (callback, mut events) = recorder();
        proxy.set_callback(callback);

        proxy.load(1);

        assert_eq!(next(&mut events).await, Event::Success(1, "a1".into()));
        assert_eq!(next(&mut events).await, Event::Complete(1));
        settle(&h).await;
        assert!(events.try_recv().is_err());
    }
}
