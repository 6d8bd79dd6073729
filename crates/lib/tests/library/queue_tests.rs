//! Queue views and on-demand convergence over HTTP.

use axum::http::{Request, StatusCode};
use serde_json::json;

use convoy_lib::config::ServerConfig;
use convoy_lib::gdm::{DeployStatus, Deployable, Deployment, DeploySpec, DeploymentTargetId, Gdm, Rectification};

use super::common::{TestApp, get, send};

fn deployable(repo: &str, cluster: &str, version: &str) -> Deployable {
  Deployable::new(
    Deployment::new(DeploymentTargetId::new(repo, cluster), DeploySpec::new(version)),
    DeployStatus::Active,
  )
}

#[tokio::test]
async fn lists_queue_lengths() {
  let (app, gate) = TestApp::gated();
  app.ctx.queues.push(Rectification::create(deployable("one", "east", "1")));
  app.ctx.queues.push(Rectification::create(deployable("two", "east", "1")));
  app.ctx.queues.push(Rectification::create(deployable("two", "east", "2")));

  let response = send(app.router(), get("/deployqueues")).await;
  assert_eq!(response.status, StatusCode::OK);
  let queues = response.json()["queues"].as_array().unwrap().clone();
  assert_eq!(queues.len(), 2);
  assert_eq!(queues[0]["target"]["repo"], "one");
  assert_eq!(queues[0]["length"], 1);
  assert_eq!(queues[1]["target"]["repo"], "two");
  assert_eq!(queues[1]["length"], 2);
  gate.add_permits(3);
}

#[tokio::test]
async fn queue_lists_positions_head_first() {
  let (app, gate) = TestApp::gated();
  let first = app.ctx.queues.push(Rectification::create(deployable("svc", "east", "1"))).unwrap();
  let second = app.ctx.queues.push(Rectification::create(deployable("svc", "east", "2"))).unwrap();

  let response = send(app.router(), get("/deployqueue?repo=svc&cluster=east")).await;
  assert_eq!(response.status, StatusCode::OK);
  let body = response.json();
  assert_eq!(body["queue"][0]["id"], json!(first.id.0));
  assert_eq!(body["queue"][0]["pos"], 0);
  assert_eq!(body["queue"][1]["id"], json!(second.id.0));
  assert_eq!(body["queue"][1]["pos"], 1);
  gate.add_permits(2);
}

#[tokio::test]
async fn unknown_queue_and_item_are_not_found() {
  let app = TestApp::new();
  let response = send(app.router(), get("/deployqueue?repo=svc&cluster=east")).await;
  assert_eq!(response.status, StatusCode::NOT_FOUND);

  app.ctx.queues.push(Rectification::create(deployable("svc", "east", "1")));
  let response = send(app.router(), get("/deployqueue/item?repo=svc&cluster=east&id=nope")).await;
  assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn item_without_wait_is_returned_as_is() {
  let (app, gate) = TestApp::gated();
  let queued = app.ctx.queues.push(Rectification::create(deployable("svc", "east", "1"))).unwrap();

  let uri = format!("/deployqueue/item?repo=svc&cluster=east&id={}", queued.id);
  let response = send(app.router(), get(&uri)).await;
  assert_eq!(response.status, StatusCode::OK);
  assert!(response.json()["resolution"].is_null());
  gate.add_permits(1);
}

#[tokio::test]
async fn item_wait_that_runs_out_answers_unresolved() {
  let (app, gate) = TestApp::gated();
  let queued = app.ctx.queues.push(Rectification::create(deployable("svc", "east", "1"))).unwrap();

  let uri = format!("/deployqueue/item?repo=svc&cluster=east&id={}&wait=true&timeout_secs=0", queued.id);
  let response = send(app.router(), get(&uri)).await;
  assert_eq!(response.status, StatusCode::OK);
  assert!(response.json()["resolution"].is_null());

  // The outcome is still delivered once the worker gets to it.
  gate.add_permits(1);
  let uri = format!("/deployqueue/item?repo=svc&cluster=east&id={}&wait=true", queued.id);
  let response = send(app.router(), get(&uri)).await;
  assert_eq!(response.json()["resolution"]["kind"], "create");
}

#[tokio::test]
async fn failed_rectification_reports_error() {
  let app = TestApp::new();
  app.cluster.set_offline("east", true);
  let queued = app.ctx.queues.push(Rectification::create(deployable("svc", "east", "1"))).unwrap();

  let uri = format!("/deployqueue/item?repo=svc&cluster=east&id={}&wait=true", queued.id);
  let response = send(app.router(), get(&uri)).await;
  let resolution = &response.json()["resolution"];
  assert_eq!(resolution["kind"], "create");
  assert_eq!(resolution["error"]["retryable"], true);
}

#[tokio::test]
async fn rectify_all_converges_clusters() {
  let config = ServerConfig {
    clusters: vec!["east".to_string(), "west".to_string()],
    ..Default::default()
  };
  let app = TestApp::with_config(config);
  app.cluster.insert(deployable("stale", "west", "1"));
  let mut gdm = Gdm::default();
  gdm.deployments.insert(Deployment::new(
    DeploymentTargetId::new("svc", "east"),
    DeploySpec::new("4.0.0"),
  ));
  app.seed(&gdm);

  let request = Request::post("/rectify-all").body(axum::body::Body::empty()).unwrap();
  let response = send(app.router(), request).await;
  assert_eq!(response.status, StatusCode::OK);
  assert_eq!(response.json()["queued"], 2);
  assert_eq!(response.json()["unreachable"], json!([]));

  for target in [DeploymentTargetId::new("svc", "east"), DeploymentTargetId::new("stale", "west")] {
    let queue = app.ctx.queues.queue(&target).unwrap();
    let id = queue.snapshot().into_iter().chain(queue.completed()).next().unwrap().id;
    let resolution = app
      .ctx
      .queues
      .wait(&target, &id, std::time::Duration::from_secs(5))
      .await
      .unwrap();
    assert!(resolution.is_success());
  }
  assert!(app.cluster.get(&DeploymentTargetId::new("stale", "west")).is_none());
  assert_eq!(
    app.cluster.get(&DeploymentTargetId::new("svc", "east")).unwrap().deployment.spec.version,
    "4.0.0"
  );
}
