//! The client against a live server on a local port.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use convoy_lib::client::{Client, ClientError};
use convoy_lib::gdm::{DeploySpec, Deployment, DeploymentTargetId, Gdm, User};

use super::common::TestApp;

/// A view of a deployment that only knows about its version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct VersionOnly {
  version: String,
}

fn target() -> DeploymentTargetId {
  DeploymentTargetId::new("github.com/acme/api", "east")
}

fn single_query(target: &DeploymentTargetId) -> Vec<(&'static str, String)> {
  vec![("repo", target.repo.clone()), ("cluster", target.cluster.clone())]
}

async fn seeded_client() -> (TestApp, Client) {
  let app = TestApp::new();
  let mut spec = DeploySpec::new("1.0.0");
  spec.num_instances = 3;
  spec.env = BTreeMap::from([("LOG".to_string(), "debug".to_string())]);
  let mut gdm = Gdm::default();
  gdm.deployments.insert(Deployment::new(target(), spec));
  app.seed(&gdm);

  let base = app.spawn().await;
  let client = Client::new(&base).unwrap().with_user(User::new("ada", "ada@example.com"));
  (app, client)
}

#[tokio::test]
async fn retrieve_and_update_round_trip() {
  let (_app, client) = seeded_client().await;

  let (mut spec, updater) = client.deployment(&target()).await.unwrap();
  assert_eq!(spec.version, "1.0.0");
  spec.version = "1.1.0".to_string();

  let updated = updater.update(&spec).await.unwrap();
  assert_eq!(updated.value.version, "1.1.0");
  assert_ne!(updated.updater.snapshot().fingerprint, updater.snapshot().fingerprint);
  assert!(updated.rectification_id().is_some());

  let (reread, _) = client.deployment(&target()).await.unwrap();
  assert_eq!(reread, updated.value);
}

#[tokio::test]
async fn partial_view_preserves_unknown_fields() {
  let (_app, client) = seeded_client().await;
  let query = single_query(&target());
  let query: Vec<(&str, &str)> = query.iter().map(|(k, v)| (*k, v.as_str())).collect();

  let (mut view, updater) = client.retrieve::<VersionOnly>("/single-deployment", &query).await.unwrap();
  view.version = "2.0.0".to_string();
  updater.update(&view).await.unwrap();

  let (spec, _) = client.deployment(&target()).await.unwrap();
  assert_eq!(spec.version, "2.0.0");
  assert_eq!(spec.num_instances, 3);
  assert_eq!(spec.env["LOG"], "debug");
}

#[tokio::test]
async fn second_update_from_same_read_is_rejected() {
  let (_app, client) = seeded_client().await;
  let (spec, updater) = client.deployment(&target()).await.unwrap();

  let first = DeploySpec {
    version: "a".to_string(),
    ..spec.clone()
  };
  let second = DeploySpec {
    version: "b".to_string(),
    ..spec
  };
  updater.update(&first).await.unwrap();
  let err = updater.update(&second).await.unwrap_err();
  assert!(matches!(err, ClientError::PreconditionFailed));
  assert!(err.is_retryable());
}

#[tokio::test]
async fn create_twice_is_rejected() {
  let (_app, client) = seeded_client().await;
  let target = DeploymentTargetId::new("svc", "west");
  let query = single_query(&target);
  let query: Vec<(&str, &str)> = query.iter().map(|(k, v)| (*k, v.as_str())).collect();

  let created = client
    .create("/single-deployment", &query, &DeploySpec::new("1"))
    .await
    .unwrap();
  assert_eq!(created.value.version, "1");

  let err = client
    .create("/single-deployment", &query, &DeploySpec::new("2"))
    .await
    .unwrap_err();
  assert!(matches!(err, ClientError::PreconditionFailed));
}

#[tokio::test]
async fn modify_applies_change() {
  let (_app, client) = seeded_client().await;
  let query = single_query(&target());
  let query: Vec<(&str, &str)> = query.iter().map(|(k, v)| (*k, v.as_str())).collect();

  let updated = client
    .modify::<DeploySpec, _>("/single-deployment", &query, 3, |spec| spec.num_instances += 1)
    .await
    .unwrap();
  assert_eq!(updated.value.num_instances, 4);
}

#[tokio::test]
async fn whole_gdm_update_adds_deployment() {
  let (_app, client) = seeded_client().await;
  let (mut gdm, updater) = client.gdm().await.unwrap();
  gdm.deployments.insert(Deployment::new(
    DeploymentTargetId::new("svc", "west"),
    DeploySpec::new("0.1.0"),
  ));

  let updated = updater.update(&gdm).await.unwrap();
  assert_eq!(updated.value.deployments.len(), 2);
  assert!(updated.location.is_none());
}

#[tokio::test]
async fn waits_for_rectification() {
  let (app, client) = seeded_client().await;
  let (mut spec, updater) = client.deployment(&target()).await.unwrap();
  spec.version = "5.0.0".to_string();
  let updated = updater.update(&spec).await.unwrap();
  let id = updated.rectification_id().unwrap();

  let item = client.item(&target(), &id, Some(Duration::from_secs(10))).await.unwrap();
  let resolution = item.resolution.unwrap();
  assert!(resolution.is_success());
  assert_eq!(app.cluster.get(&target()).unwrap().deployment.spec.version, "5.0.0");

  let queues = client.queues().await.unwrap();
  assert_eq!(queues.queues.len(), 1);
  assert_eq!(queues.queues[0].length, 0);
}

#[tokio::test]
async fn missing_resources_map_to_not_found() {
  let (_app, client) = seeded_client().await;
  let unknown = DeploymentTargetId::new("nope", "east");

  assert!(matches!(
    client.deployment(&unknown).await.unwrap_err(),
    ClientError::NotFound(_)
  ));
  assert!(matches!(client.queue(&unknown).await.unwrap_err(), ClientError::NotFound(_)));
}

#[tokio::test]
async fn rectify_all_reports_pass() {
  let (_app, client) = seeded_client().await;
  let report = client.rectify_all().await.unwrap();
  assert_eq!(report.queued, 1);
  assert!(report.unreachable.is_empty());
}
