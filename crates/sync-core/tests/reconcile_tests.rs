//! Integration tests for pod reconciliation against annotations and the
//! Prometheus store

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;
use sync_core::options::keys;
use sync_core::{
    CheckError, CheckResult, ContainerError, Options, PrometheusStore, ReconcilerBuilder,
    SyncConfig, VersionChecker,
};
use tokio_util::sync::CancellationToken;

/// Checker reporting every image as one minor version behind
struct StubChecker;

#[async_trait]
impl VersionChecker for StubChecker {
    async fn check(
        &self,
        _cancel: &CancellationToken,
        _pod: &Pod,
        container: &Container,
        _options: &Options,
    ) -> Result<Option<CheckResult>, CheckError> {
        let image = container.image.clone().unwrap_or_default();
        let (url, tag) = image.split_once(':').unwrap_or((image.as_str(), "latest"));

        Ok(Some(CheckResult {
            image_url: url.to_string(),
            current_version: tag.to_string(),
            latest_version: "9.9.9".to_string(),
            is_latest: false,
            os: "linux".to_string(),
            architecture: "arm64".to_string(),
        }))
    }
}

fn pod(annotations: &[(&str, &str, &str)], containers: &[&str]) -> Pod {
    let annotations: BTreeMap<String, String> = annotations
        .iter()
        .map(|(option, container, value)| {
            (keys::for_container(option, container), value.to_string())
        })
        .collect();

    Pod {
        metadata: ObjectMeta {
            name: Some("api-7d9f".to_string()),
            namespace: Some("prod".to_string()),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: containers
                .iter()
                .map(|name| Container {
                    name: name.to_string(),
                    image: Some(format!("ghcr.io/acme/{}:1.4.2", name)),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn setup(config: SyncConfig) -> (Arc<PrometheusStore>, sync_core::Reconciler) {
    let store = Arc::new(PrometheusStore::new().unwrap());
    let reconciler = ReconcilerBuilder::new()
        .checker(Arc::new(StubChecker))
        .store(store.clone())
        .config(config)
        .build()
        .unwrap();

    (store, reconciler)
}

#[tokio::test]
async fn test_enable_toggle_removes_metric() {
    let (store, reconciler) = setup(SyncConfig::default());
    let cancel = CancellationToken::new();

    let enabled = pod(&[(keys::ENABLE, "app", "true")], &["app"]);
    reconciler.reconcile(&cancel, &enabled).await.unwrap();

    let entry = store.entry("prod", "api-7d9f", "app").unwrap();
    assert_eq!(entry.image_url, "ghcr.io/acme/app");
    assert_eq!(entry.current_version, "1.4.2");
    assert_eq!(entry.arch, "arm64");

    let rendered = store.render().unwrap();
    assert!(rendered.contains("version_checker_is_latest_version{"));
    assert!(rendered.contains("container=\"app\""));

    let disabled = pod(&[(keys::ENABLE, "app", "false")], &["app"]);
    reconciler.reconcile(&cancel, &disabled).await.unwrap();

    assert!(store.entry("prod", "api-7d9f", "app").is_none());
    assert!(!store.render().unwrap().contains("container=\"app\""));
}

#[tokio::test]
async fn test_unannotated_containers_skipped_by_default() {
    let (store, reconciler) = setup(SyncConfig::default());

    let pod = pod(&[(keys::ENABLE, "app", "true")], &["app", "proxy"]);
    reconciler
        .reconcile(&CancellationToken::new(), &pod)
        .await
        .unwrap();

    assert_eq!(store.len(), 1);
    assert!(store.entry("prod", "api-7d9f", "proxy").is_none());
}

#[tokio::test]
async fn test_default_test_all_from_config() {
    let config = config::Config::builder()
        .set_override("default_test_all", true)
        .unwrap()
        .build()
        .unwrap();
    let (store, reconciler) = setup(SyncConfig::from_config(config).unwrap());

    let pod = pod(&[(keys::ENABLE, "proxy", "false")], &["app", "proxy", "db"]);
    reconciler
        .reconcile(&CancellationToken::new(), &pod)
        .await
        .unwrap();

    assert_eq!(store.len(), 2);
    assert!(store.entry("prod", "api-7d9f", "app").is_some());
    assert!(store.entry("prod", "api-7d9f", "db").is_some());
}

#[tokio::test]
async fn test_invalid_regex_is_configuration_error() {
    let (store, reconciler) = setup(SyncConfig::default());

    let pod = pod(
        &[
            (keys::ENABLE, "app", "true"),
            (keys::MATCH_REGEX, "app", "v(1\\."),
            (keys::ENABLE, "db", "true"),
        ],
        &["app", "db"],
    );
    let err = reconciler
        .reconcile(&CancellationToken::new(), &pod)
        .await
        .unwrap_err();

    assert_eq!(err.failures.len(), 1);
    assert!(matches!(
        &err.failures[0],
        ContainerError::Configuration { container, .. } if container == "app"
    ));
    assert!(err.to_string().starts_with("failed to sync pod prod/api-7d9f: "));
    assert!(!err.is_retryable());

    assert!(store.entry("prod", "api-7d9f", "app").is_none());
    assert!(store.entry("prod", "api-7d9f", "db").is_some());
}

#[tokio::test]
async fn test_conflicting_options_report_container() {
    let (_store, reconciler) = setup(SyncConfig::default());

    let pod = pod(
        &[
            (keys::ENABLE, "app", "true"),
            (keys::USE_SHA, "app", "true"),
            (keys::PIN_MAJOR, "app", "2"),
        ],
        &["app"],
    );
    let err = reconciler
        .reconcile(&CancellationToken::new(), &pod)
        .await
        .unwrap_err();

    assert_eq!(err.failed_containers().collect::<Vec<_>>(), vec!["app"]);
    assert!(err.to_string().contains("failed to build version options"));
}

#[test]
fn test_init_tracing_once() {
    assert!(sync_core::observability::init_tracing(true).is_ok());
    assert!(sync_core::observability::init_tracing(false).is_err());
}
