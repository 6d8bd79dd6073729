//! Shared helpers for library integration tests.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower::ServiceExt;

use convoy_lib::config::ServerConfig;
use convoy_lib::gdm::{Gdm, User};
use convoy_lib::queue::{QueueSet, QueuedRectification, Resolution, ResolutionKind, Resolver};
use convoy_lib::rectify::{MemoryCluster, Rectifier};
use convoy_lib::server::{AppContext, router, serve};
use convoy_lib::state::{MemoryStateStore, Revision, StateRead, StateStore, StoreError};

/// A server context over an in-memory store and cluster.
pub struct TestApp {
  pub ctx: AppContext,
  pub cluster: Arc<MemoryCluster>,
}

impl TestApp {
  /// Rectifications are applied to `cluster` as soon as they are queued.
  pub fn new() -> Self {
    Self::with_config(ServerConfig::default())
  }

  pub fn with_config(config: ServerConfig) -> Self {
    let cluster = Arc::new(MemoryCluster::default());
    let queues = QueueSet::new(Arc::new(Rectifier::new(Arc::clone(&cluster))));
    Self::assemble(Arc::new(MemoryStateStore::default()), queues, cluster, config)
  }

  /// Rectifications only complete when the returned gate hands out permits,
  /// and resolve to their queued post without touching the cluster.
  pub fn gated() -> (Self, Arc<Semaphore>) {
    let cluster = Arc::new(MemoryCluster::default());
    let gate = Arc::new(Semaphore::new(0));
    let queues = QueueSet::new(Arc::new(GatedResolver {
      gate: Arc::clone(&gate),
      inner: None,
    }));
    let app = Self::assemble(
      Arc::new(MemoryStateStore::default()),
      queues,
      cluster,
      ServerConfig::default(),
    );
    (app, gate)
  }

  /// Like [`TestApp::gated`], but each released rectification converges
  /// `cluster` on the GDM as it stands at that moment.
  pub fn gated_converging() -> (Self, Arc<Semaphore>) {
    let cluster = Arc::new(MemoryCluster::default());
    let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::default());
    let gate = Arc::new(Semaphore::new(0));
    let rectifier = Rectifier::new(Arc::clone(&cluster)).converging(Arc::clone(&store), Arc::clone(&cluster) as _);
    let queues = QueueSet::new(Arc::new(GatedResolver {
      gate: Arc::clone(&gate),
      inner: Some(Arc::new(rectifier)),
    }));
    let app = Self::assemble(store, queues, cluster, ServerConfig::default());
    (app, gate)
  }

  pub fn with_store(store: Arc<dyn StateStore>, config: ServerConfig) -> Self {
    let cluster = Arc::new(MemoryCluster::default());
    let queues = QueueSet::new(Arc::new(Rectifier::new(Arc::clone(&cluster))));
    Self::assemble(store, queues, cluster, config)
  }

  fn assemble(store: Arc<dyn StateStore>, queues: QueueSet, cluster: Arc<MemoryCluster>, config: ServerConfig) -> Self {
    let ctx = AppContext::new(store, queues, Arc::clone(&cluster) as _, config);
    Self { ctx, cluster }
  }

  pub fn router(&self) -> Router {
    router(self.ctx.clone())
  }

  /// Seeds the store directly.
  pub fn seed(&self, gdm: &Gdm) {
    let base = self.ctx.store.read().unwrap().revision;
    self.ctx.store.write(gdm, &base, &User::default()).unwrap();
  }

  /// Serves on an ephemeral local port and returns the base URL.
  pub async fn spawn(&self) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(self.ctx.clone(), listener, std::future::pending()));
    format!("http://{addr}")
  }
}

/// Resolves once a permit is available, through `inner` when set.
struct GatedResolver {
  gate: Arc<Semaphore>,
  inner: Option<Arc<dyn Resolver>>,
}

#[async_trait]
impl Resolver for GatedResolver {
  async fn resolve(&self, queued: &QueuedRectification) -> Resolution {
    self.gate.acquire().await.unwrap().forget();
    match &self.inner {
      Some(inner) => inner.resolve(queued).await,
      None => Resolution::succeeded(
        queued.target().clone(),
        ResolutionKind::intended(&queued.rectification),
        queued.rectification.post.clone(),
      ),
    }
  }
}

/// Reads through to a real store; every write loses a race.
pub struct RacingStore {
  pub inner: MemoryStateStore,
}

impl StateStore for RacingStore {
  fn read(&self) -> Result<StateRead, StoreError> {
    self.inner.read()
  }

  fn write(&self, _gdm: &Gdm, based_on: &Revision, _actor: &User) -> Result<Revision, StoreError> {
    Err(StoreError::Conflict {
      expected: based_on.clone(),
      actual: Revision::from("someone-else"),
    })
  }
}

/// A store that cannot be read.
pub struct BrokenStore;

impl StateStore for BrokenStore {
  fn read(&self) -> Result<StateRead, StoreError> {
    Err(StoreError::Read(io::Error::other("disk on fire")))
  }

  fn write(&self, _gdm: &Gdm, _based_on: &Revision, _actor: &User) -> Result<Revision, StoreError> {
    Err(StoreError::Write(io::Error::other("disk on fire")))
  }
}

pub struct TestResponse {
  pub status: StatusCode,
  pub headers: HeaderMap,
  pub body: Vec<u8>,
}

impl TestResponse {
  pub fn json(&self) -> serde_json::Value {
    serde_json::from_slice(&self.body).unwrap()
  }

  pub fn etag(&self) -> String {
    self.headers["etag"].to_str().unwrap().to_string()
  }
}

pub async fn send(router: Router, request: Request<Body>) -> TestResponse {
  let response = router.oneshot(request).await.unwrap();
  let status = response.status();
  let headers = response.headers().clone();
  let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
  TestResponse { status, headers, body }
}

pub fn get(uri: &str) -> Request<Body> {
  Request::get(uri).body(Body::empty()).unwrap()
}

pub fn put(uri: &str, headers: &[(&str, &str)], body: impl Into<Body>) -> Request<Body> {
  let mut builder = Request::put(uri).header("content-type", "application/json");
  for (name, value) in headers {
    builder = builder.header(*name, *value);
  }
  builder.body(body.into()).unwrap()
}
