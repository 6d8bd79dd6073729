//! The convoy HTTP service.
//!
//! # Routes
//!
//! | method  | path                  | purpose                                   |
//! |---------|-----------------------|-------------------------------------------|
//! | GET/PUT | `/gdm`                | the whole GDM, conditionally updated      |
//! | GET/PUT | `/single-deployment`  | one target's spec; PUT queues a rectification |
//! | GET     | `/deployqueues`       | queue length per target                   |
//! | GET     | `/deployqueue`        | pending items of one target               |
//! | GET     | `/deployqueue/item`   | one item, optionally waiting for it       |
//! | POST    | `/rectify-all`        | one convergence pass                      |
//!
//! Targets are addressed by the `repo`, `dir`, `flavor` and `cluster` query
//! parameters.

pub mod conditional;
mod error;
mod gdm;
mod queue;
pub mod wire;

use std::future::Future;
use std::io;
use std::sync::Arc;

use axum::Router;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::consts::{USER_EMAIL_HEADER, USER_NAME_HEADER};
use crate::gdm::{DeploymentTargetId, Gdm, User};
use crate::queue::{QueueSet, RectificationId};
use crate::rectify::{ClusterInventory, MemoryCluster, Rectifier};
use crate::state::{FileStateStore, MemoryStateStore, Revision, StateRead, StateStore, StoreError};

pub use error::{ApiError, InternalDetail};
pub use gdm::{SingleDeployment, WholeGdm};

use wire::TargetQuery;

/// Everything a request handler needs, built once at startup.
#[derive(Clone)]
pub struct AppContext {
  pub store: Arc<dyn StateStore>,
  pub queues: QueueSet,
  pub inventory: Arc<dyn ClusterInventory>,
  pub config: Arc<ServerConfig>,
}

impl AppContext {
  pub fn new(
    store: Arc<dyn StateStore>,
    queues: QueueSet,
    inventory: Arc<dyn ClusterInventory>,
    config: ServerConfig,
  ) -> Self {
    Self {
      store,
      queues,
      inventory,
      config: Arc::new(config),
    }
  }

  /// Wires a context from configuration, with an in-process cluster
  /// standing in for the scheduler.
  ///
  /// Must be called inside a Tokio runtime.
  pub fn from_config(config: ServerConfig) -> Self {
    let store: Arc<dyn StateStore> = if config.memory {
      Arc::new(MemoryStateStore::default())
    } else {
      Arc::new(FileStateStore::new(config.state_path()))
    };
    let cluster = Arc::new(MemoryCluster::default());
    let rectifier = Rectifier::new(Arc::clone(&cluster)).converging(Arc::clone(&store), Arc::clone(&cluster) as _);
    let queues = QueueSet::with_retention(Arc::new(rectifier), config.queue_retention);
    Self::new(store, queues, cluster, config)
  }

  /// Reads the GDM on the blocking pool.
  pub async fn read_state(&self) -> Result<StateRead, StoreError> {
    let store = Arc::clone(&self.store);
    tokio::task::spawn_blocking(move || store.read()).await?
  }

  /// Writes the GDM on the blocking pool.
  pub async fn write_state(&self, gdm: Gdm, based_on: Revision, actor: User) -> Result<Revision, StoreError> {
    let store = Arc::clone(&self.store);
    tokio::task::spawn_blocking(move || store.write(&gdm, &based_on, &actor)).await?
  }
}

impl std::fmt::Debug for AppContext {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AppContext")
      .field("queues", &self.queues)
      .field("config", &self.config)
      .finish_non_exhaustive()
  }
}

pub fn router(ctx: AppContext) -> Router {
  Router::new()
    .route("/gdm", get(gdm::get_gdm).put(gdm::put_gdm))
    .route("/single-deployment", get(gdm::get_single).put(gdm::put_single))
    .route("/deployqueues", get(queue::list_queues))
    .route("/deployqueue", get(queue::get_queue))
    .route("/deployqueue/item", get(queue::get_item))
    .route("/rectify-all", post(queue::rectify_all))
    .layer(CatchPanicLayer::custom(error::panic_response))
    .layer(axum::middleware::from_fn_with_state(
      ctx.clone(),
      error::reveal_internal_detail,
    ))
    .layer(TraceLayer::new_for_http())
    .with_state(ctx)
}

/// Serves until `shutdown` resolves, then stops accepting rectifications.
pub async fn serve(ctx: AppContext, listener: TcpListener, shutdown: impl Future<Output = ()> + Send + 'static) -> io::Result<()> {
  let addr = listener.local_addr()?;
  info!(addr = %addr, "convoy server listening");

  let queues = ctx.queues.clone();
  let auto = ctx
    .config
    .auto_resolve_interval()
    .map(|interval| crate::rectify::spawn_auto_resolver(ctx.clone(), interval));

  let result = axum::serve(listener, router(ctx)).with_graceful_shutdown(shutdown).await;

  queues.shutdown();
  if let Some(handle) = auto {
    handle.abort();
  }
  info!("convoy server stopped");
  result
}

/// The acting user, from the `x-convoy-user-*` headers.
pub fn user_from_headers(headers: &HeaderMap) -> User {
  let value = |name: &str| {
    headers
      .get(name)
      .and_then(|v| v.to_str().ok())
      .unwrap_or_default()
      .to_string()
  };
  let name = value(USER_NAME_HEADER);
  User::new(if name.is_empty() { "unknown".to_string() } else { name }, value(USER_EMAIL_HEADER))
}

/// Path and query of `/deployqueue/item` for one rectification.
pub fn item_location(target: &DeploymentTargetId, id: &RectificationId) -> String {
  let query = TargetQuery::from(target);
  let encoded = url::form_urlencoded::Serializer::new(String::new())
    .extend_pairs(query.pairs())
    .append_pair("id", &id.0)
    .finish();
  format!("/deployqueue/item?{encoded}")
}
