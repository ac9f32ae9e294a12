//! WorkUnit - 非同期処理のレシピ
//!
//! WorkUnit 自体はリソースを持ちません。`stream()` を呼ぶたびに
//! source を呼び直して新しい結果ストリームを作ります。
//! そのため cache から追い出されても取消処理は不要です。

use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use parking_lot::Mutex;

use crate::domain::{ActionParameter, BoxError, Pages};

/// Result stream of one execution.
pub type SourceStream<D> = BoxStream<'static, Result<D, BoxError>>;

type Source<ID, D> = Arc<dyn Fn(ID, Option<Pages>) -> SourceStream<D> + Send + Sync>;

/// A reusable recipe for one asynchronous operation.
pub struct WorkUnit<ID, D> {
    id: Mutex<ID>,
    pages: Option<Pages>,
    source: Source<ID, D>,
}

impl<ID, D> WorkUnit<ID, D>
where
    ID: Clone + Send + 'static,
    D: Send + 'static,
{
    /// A source that takes only the request id.
    pub fn new<F>(id: ID, source: F) -> Self
    where
        F: Fn(ID) -> SourceStream<D> + Send + Sync + 'static,
    {
        Self {
            id: Mutex::new(id),
            pages: None,
            source: Arc::new(move |id, _| source(id)),
        }
    }

    /// A paged source; the page cursor is fixed for the life of this unit.
    pub fn paged<F>(id: ID, pages: Pages, source: F) -> Self
    where
        F: Fn(ID, Pages) -> SourceStream<D> + Send + Sync + 'static,
    {
        Self {
            id: Mutex::new(id),
            pages: Some(pages),
            source: Arc::new(move |id, pages| source(id, pages.unwrap_or_default())),
        }
    }

    /// A source that resolves once; the result becomes a one-item stream.
    pub fn from_future<F, Fut>(id: ID, call: F) -> Self
    where
        F: Fn(ID) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<D, BoxError>> + Send + 'static,
    {
        Self::new(id, move |id| stream::once(call(id)).boxed())
    }

    /// Paged counterpart of [`WorkUnit::from_future`].
    pub fn paged_future<F, Fut>(id: ID, pages: Pages, call: F) -> Self
    where
        F: Fn(ID, Pages) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<D, BoxError>> + Send + 'static,
    {
        Self::paged(id, pages, move |id, pages| stream::once(call(id, pages)).boxed())
    }

    pub fn id(&self) -> ID {
        self.id.lock().clone()
    }

    pub fn pages(&self) -> Option<Pages> {
        self.pages
    }

    /// Overwrite the identity used by the next `stream()` call.
    ///
    /// Two proxies hitting the same slot race here: last writer wins.
    pub fn rebind(&self, id: ID) {
        *self.id.lock() = id;
    }

    /// Invoke the source once with the current identity.
    pub fn stream(&self) -> SourceStream<D> {
        let id = self.id();
        (self.source)(id, self.pages)
    }
}

/// Builds a work unit for a cache miss.
pub trait WorkUnitFactory<ID, D>: Send + Sync {
    fn create(&self, id: &ID, action: &ActionParameter) -> WorkUnit<ID, D>;
}

impl<ID, D, F> WorkUnitFactory<ID, D> for F
where
    F: Fn(&ID, &ActionParameter) -> WorkUnit<ID, D> + Send + Sync,
{
    fn create(&self, id: &ID, action: &ActionParameter) -> WorkUnit<ID, D> {
        self(id, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn stream_reinvokes_the_source_each_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let unit = WorkUnit::from_future(3u32, move |id| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, BoxError>(id * 2) }
        });

        let first: Vec<_> = unit.stream().collect().await;
        let second: Vec<_> = unit.stream().collect().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(first.len(), 1);
        assert_eq!(*second[0].as_ref().unwrap(), 6);
    }

    #[tokio::test]
    async fn rebind_changes_the_next_execution() {
        let unit = WorkUnit::from_future(1u32, |id| async move { Ok::<_, BoxError>(id) });
        unit.rebind(5);

        let mut results = unit.stream();
        let value = results.next().await.unwrap().unwrap();
        assert_eq!(value, 5);
        assert_eq!(unit.id(), 5);
    }

    #[tokio::test]
    async fn paged_unit_passes_its_cursor() {
        let pages = Pages { page: 3, size: 10 };
        let unit = WorkUnit::paged("feed".to_string(), pages, |id, pages| {
            stream::iter(vec![Ok::<_, BoxError>(format!("{id}:{}:{}", pages.page, pages.size))])
                .boxed()
        });

        let value = unit.stream().next().await.unwrap().unwrap();
        assert_eq!(value, "feed:3:10");
        assert_eq!(unit.pages(), Some(pages));
    }

    #[test]
    fn closures_are_factories() {
        let factory = |id: &u32, _action: &ActionParameter| {
            WorkUnit::from_future(*id, |id| async move { Ok::<_, BoxError>(id) })
        };
        let unit = factory.create(&9, &ActionParameter::load());
        assert_eq!(unit.id(), 9);
    }
}
