//! Conditional reads and updates over `/gdm` and `/single-deployment`.

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::{Value, json};

use convoy_lib::config::ServerConfig;
use convoy_lib::gdm::{DeploySpec, Deployment, DeploymentTargetId, Gdm};
use convoy_lib::state::MemoryStateStore;

use super::common::{BrokenStore, RacingStore, TestApp, get, put, send};

const SINGLE: &str = "/single-deployment?repo=github.com%2Facme%2Fapi&cluster=east";

fn seeded() -> TestApp {
  let app = TestApp::new();
  let mut gdm = Gdm::default();
  gdm.deployments.insert(Deployment::new(
    DeploymentTargetId::new("github.com/acme/api", "east"),
    DeploySpec::new("1.0.0"),
  ));
  app.seed(&gdm);
  app
}

fn with_canary(mut body: Value, etag: &str) -> Vec<u8> {
  body[etag.trim_matches('"')] = json!("canary");
  serde_json::to_vec(&body).unwrap()
}

fn with_version(body: &[u8], version: &str) -> Vec<u8> {
  let mut value: Value = serde_json::from_slice(body).unwrap();
  value["version"] = json!(version);
  serde_json::to_vec(&value).unwrap()
}

mod reads {
  use super::*;

  #[tokio::test]
  async fn get_carries_etag_and_canary() {
    let app = seeded();
    let response = send(app.router(), get("/gdm")).await;

    assert_eq!(response.status, StatusCode::OK);
    let etag = response.etag();
    let fingerprint = etag.trim_matches('"');
    assert_eq!(response.json()[fingerprint], "canary");
    assert_eq!(response.json()["deployments"][0]["version"], "1.0.0");
  }

  #[tokio::test]
  async fn unknown_single_deployment_is_not_found() {
    let app = seeded();
    let response = send(app.router(), get("/single-deployment?repo=nope&cluster=east")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn target_needs_repo_and_cluster() {
    let app = seeded();
    let response = send(app.router(), get("/single-deployment?repo=x")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn etag_ignores_deployment_order() {
    let app = TestApp::new();
    let empty = send(app.router(), get("/gdm")).await;
    let listed = json!({
      "deployments": [
        {"repo": "b", "cluster": "east", "version": "1"},
        {"repo": "a", "cluster": "east", "version": "1"}
      ]
    });
    let first = send(
      app.router(),
      put("/gdm", &[("if-match", empty.etag().as_str())], with_canary(listed, &empty.etag())),
    )
    .await;
    assert_eq!(first.status, StatusCode::OK);

    let reordered = json!({
      "deployments": [
        {"repo": "a", "cluster": "east", "version": "1"},
        {"repo": "b", "cluster": "east", "version": "1"}
      ]
    });
    let second = send(
      app.router(),
      put("/gdm", &[("if-match", first.etag().as_str())], with_canary(reordered, &first.etag())),
    )
    .await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.etag(), first.etag());
  }
}

mod preconditions {
  use super::*;

  #[tokio::test]
  async fn missing_precondition_is_428() {
    let app = seeded();
    let current = send(app.router(), get("/gdm")).await;
    let response = send(app.router(), put("/gdm", &[], current.body)).await;
    assert_eq!(response.status, StatusCode::PRECONDITION_REQUIRED);
  }

  #[tokio::test]
  async fn round_trip_is_a_no_op() {
    let app = seeded();
    let current = send(app.router(), get("/gdm")).await;
    let etag = current.etag();

    let response = send(app.router(), put("/gdm", &[("if-match", etag.as_str())], current.body.clone())).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.etag(), etag);
    assert_eq!(response.json(), current.json());
  }

  #[tokio::test]
  async fn stale_etag_is_412_with_current_body() {
    let app = seeded();
    let read = send(app.router(), get(SINGLE)).await;
    let etag = read.etag();

    let first = send(
      app.router(),
      put(SINGLE, &[("if-match", etag.as_str())], with_version(&read.body, "2.0.0")),
    )
    .await;
    assert_eq!(first.status, StatusCode::ACCEPTED);

    let second = send(
      app.router(),
      put(SINGLE, &[("if-match", etag.as_str())], with_version(&read.body, "3.0.0")),
    )
    .await;
    assert_eq!(second.status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(second.json()["version"], "2.0.0");
    assert_eq!(second.etag(), first.etag());
  }

  #[tokio::test]
  async fn create_of_existing_is_412() {
    let app = seeded();
    let body = serde_json::to_vec(&json!({"version": "9"})).unwrap();
    let response = send(app.router(), put(SINGLE, &[("if-none-match", "*")], body)).await;
    assert_eq!(response.status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(response.json()["version"], "1.0.0");

    let gdm = send(app.router(), get("/gdm")).await;
    let response = send(app.router(), put("/gdm", &[("if-none-match", "*")], gdm.body)).await;
    assert_eq!(response.status, StatusCode::PRECONDITION_FAILED);
  }

  #[tokio::test]
  async fn if_match_on_missing_resource_is_412() {
    let app = seeded();
    let body = serde_json::to_vec(&json!({"version": "1"})).unwrap();
    let response = send(
      app.router(),
      put("/single-deployment?repo=new&cluster=east", &[("if-match", "\"abc\"")], body),
    )
    .await;
    assert_eq!(response.status, StatusCode::PRECONDITION_FAILED);
  }

  #[tokio::test]
  async fn missing_canary_is_400() {
    let app = seeded();
    let read = send(app.router(), get(SINGLE)).await;
    let etag = read.etag();

    let mut body: Value = serde_json::from_slice(&read.body).unwrap();
    body.as_object_mut().unwrap().remove(etag.trim_matches('"'));
    let response = send(
      app.router(),
      put(SINGLE, &[("if-match", etag.as_str())], serde_json::to_vec(&body).unwrap()),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.json()["error"].as_str().unwrap().contains("canary"));
  }

  #[tokio::test]
  async fn wrong_canary_value_is_400() {
    let app = seeded();
    let read = send(app.router(), get(SINGLE)).await;
    let etag = read.etag();

    let mut body: Value = serde_json::from_slice(&read.body).unwrap();
    body[etag.trim_matches('"')] = json!("pigeon");
    let response = send(
      app.router(),
      put(SINGLE, &[("if-match", etag.as_str())], serde_json::to_vec(&body).unwrap()),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn non_object_body_is_400() {
    let app = seeded();
    let read = send(app.router(), get(SINGLE)).await;
    let response = send(app.router(), put(SINGLE, &[("if-match", read.etag().as_str())], "[1, 2]")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn array_body_on_create_is_400() {
    let app = TestApp::new();
    let uri = "/single-deployment?repo=svc&cluster=west";
    let response = send(app.router(), put(uri, &[("if-none-match", "*")], r#"["1.0",1,{},{},{},[]]"#)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.json()["error"].as_str().unwrap().contains("JSON object"));

    let missing = send(app.router(), get(uri)).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert!(app.ctx.queues.queues().is_empty());
  }

  #[tokio::test]
  async fn duplicate_targets_are_400() {
    let app = TestApp::new();
    let read = send(app.router(), get("/gdm")).await;
    let etag = read.etag();
    let body = json!({
      "deployments": [
        {"repo": "a", "cluster": "east", "version": "1"},
        {"repo": "a", "cluster": "east", "version": "2"}
      ]
    });

    let response = send(app.router(), put("/gdm", &[("if-match", etag.as_str())], with_canary(body, &etag))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
  }
}

mod writes {
  use super::*;

  #[tokio::test]
  async fn create_single_deployment_queues_rectification() {
    let app = TestApp::new();
    let uri = "/single-deployment?repo=svc&cluster=west";
    let body = serde_json::to_vec(&json!({"version": "1.2.3", "num_instances": 2})).unwrap();

    let response = send(app.router(), put(uri, &[("if-none-match", "*")], body)).await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.json()["num_instances"], 2);

    let location = response.headers["location"].to_str().unwrap().to_string();
    assert!(location.starts_with("/deployqueue/item?repo=svc&dir=&flavor=&cluster=west&id="));

    let waited = send(app.router(), get(&format!("{location}&wait=true"))).await;
    assert_eq!(waited.status, StatusCode::OK);
    assert_eq!(waited.json()["resolution"]["kind"], "create");

    let deployed = app.cluster.get(&DeploymentTargetId::new("svc", "west")).unwrap();
    assert_eq!(deployed.deployment.spec.version, "1.2.3");
  }

  #[tokio::test]
  async fn outstanding_rectification_deploys_latest_write() {
    let (app, gate) = TestApp::gated_converging();
    let uri = "/single-deployment?repo=svc&cluster=west";
    let body = serde_json::to_vec(&json!({"version": "1"})).unwrap();

    let created = send(app.router(), put(uri, &[("if-none-match", "*")], body)).await;
    assert_eq!(created.status, StatusCode::ACCEPTED);
    let location = created.headers["location"].to_str().unwrap().to_string();

    let updated = send(
      app.router(),
      put(uri, &[("if-match", created.etag().as_str())], with_version(&created.body, "2")),
    )
    .await;
    assert_eq!(updated.status, StatusCode::ACCEPTED);
    assert_eq!(updated.headers["location"], location.as_str());

    let target = DeploymentTargetId::new("svc", "west");
    assert_eq!(app.ctx.queues.queue(&target).unwrap().len(), 1);

    gate.add_permits(1);
    let waited = send(app.router(), get(&format!("{location}&wait=true"))).await;
    let resolution = &waited.json()["resolution"];
    assert_eq!(resolution["kind"], "create");
    assert_eq!(resolution["deploy_state"]["deployment"]["version"], "2");
    assert_eq!(app.cluster.get(&target).unwrap().deployment.spec.version, "2");
    assert_eq!(app.ctx.queues.queue(&target).unwrap().len(), 0);
  }

  #[tokio::test]
  async fn store_race_is_409() {
    let store = Arc::new(RacingStore {
      inner: MemoryStateStore::default(),
    });
    let app = TestApp::with_store(store, ServerConfig::default());
    let read = send(app.router(), get("/gdm")).await;

    let response = send(app.router(), put("/gdm", &[("if-match", read.etag().as_str())], read.body)).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn users_are_recorded_per_write() {
    let app = seeded();
    let read = send(app.router(), get(SINGLE)).await;
    let response = send(
      app.router(),
      put(
        SINGLE,
        &[
          ("if-match", read.etag().as_str()),
          ("x-convoy-user-name", "ada"),
          ("x-convoy-user-email", "ada@example.com"),
        ],
        with_version(&read.body, "1.0.1"),
      ),
    )
    .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
  }
}

mod internal_errors {
  use super::*;

  fn broken(secret: Option<&str>) -> TestApp {
    let config = ServerConfig {
      debug_secret: secret.map(str::to_string),
      ..Default::default()
    };
    TestApp::with_store(Arc::new(BrokenStore), config)
  }

  #[tokio::test]
  async fn detail_is_hidden_by_default() {
    let app = broken(Some("s3cret"));
    let response = send(app.router(), get("/gdm")).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json(), json!({"error": "internal server error"}));
  }

  #[tokio::test]
  async fn detail_is_revealed_with_secret() {
    let app = broken(Some("s3cret"));
    let request = axum::http::Request::get("/gdm")
      .header("x-convoy-debug-secret", "s3cret")
      .body(axum::body::Body::empty())
      .unwrap();
    let response = send(app.router(), request).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.json()["detail"].as_str().unwrap().contains("disk on fire"));
  }

  #[tokio::test]
  async fn wrong_secret_reveals_nothing() {
    let app = broken(Some("s3cret"));
    let request = axum::http::Request::get("/gdm")
      .header("x-convoy-debug-secret", "guess")
      .body(axum::body::Body::empty())
      .unwrap();
    let response = send(app.router(), request).await;
    assert!(response.json().get("detail").is_none());
  }
}
