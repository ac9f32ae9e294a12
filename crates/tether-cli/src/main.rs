use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, sleep};
use tracing_subscriber::EnvFilter;

use std::sync::atomic::{AtomicU32, Ordering};
use tether_core::app::{ProxyConfig, ProxyFactory};
use tether_core::dispatch::Callback;
use tether_core::domain::{ActionKind, ActionParameter, ApiError, BoxError, Outcome};
use tether_core::impls::SwitchProbe;

#[derive(Debug, Deserialize)]
struct User {
    id: u64,
    name: String,
}

#[async_trait]
trait UserService: Send + Sync {
    async fn fetch(&self, id: u64) -> Result<User, BoxError>;
}

/// 最初の n 回は失敗する。id=0 は常に 404
struct FlakyService {
    remaining_failures: AtomicU32,
}

impl FlakyService {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl UserService for FlakyService {
    async fn fetch(&self, id: u64) -> Result<User, BoxError> {
        sleep(Duration::from_millis(50)).await;

        if id == 0 {
            return Err(Box::new(ApiError::new(404, "no such user")));
        }

        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(format!("intentional failure (left={left})").into());
        }

        let body = format!(r#"{{"id":{id},"name":"user-{id}"}}"#);
        Ok(serde_json::from_str(&body)?)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // (A) 設定（引数があれば JSON ファイルから）と factory
    let config = match std::env::args().nth(1) {
        Some(path) => ProxyConfig::from_path(path)?,
        None => ProxyConfig::default(),
    };
    let probe = Arc::new(SwitchProbe::online());
    let factory = ProxyFactory::builder()
        .config(config)
        .connectivity(probe.clone())
        .build()?;

    // (B) proxy を作って scope に bind
    let service: Arc<dyn UserService> = Arc::new(FlakyService::new(2));
    let users = factory
        .with_id(move |id: u64| {
            let service = Arc::clone(&service);
            async move { service.fetch(id).await }
        })
        .build();

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let callback = Callback::new(|id: &u64, action: ActionParameter, outcome: Outcome<User>| {
        match outcome {
            Ok(user) => println!("[{:?}] loaded #{} {}", action.kind(), user.id, user.name),
            Err(e) => println!("[{:?}] user {id} failed: {e} (code={})", action.kind(), e.code()),
        }
        Ok(())
    })
    .on_complete(move |id: &u64, _| {
        let _ = done_tx.send(*id);
    });
    let scope = factory.scope();
    users.bind(scope.clone(), callback);

    // (C) 2 回失敗してから成功する
    for kind in [ActionKind::Load, ActionKind::Retry, ActionKind::Retry] {
        users.request(ActionParameter::new(kind), 1);
        let _ = done_rx.recv().await;
    }

    // (D) 失敗し続ける id は 9 回目の失敗のあと実行されなくなる
    for _ in 0..10 {
        users.load(0);
        let _ = done_rx.recv().await;
    }

    // (E) オフラインでは実行せずに失敗する
    probe.set_available(false);
    users.load(2);
    let _ = done_rx.recv().await;
    probe.set_available(true);

    // (F) 実行中に scope を破棄すると、何も届かない
    users.load(3);
    scope.destroy();
    factory.flush().await;
    tracing::info!(destroyed = users.is_destroyed(), working = users.is_working(), "scope destroyed");

    factory.shutdown().await;
    Ok(())
}
