//! Pod and container reconciliation
//!
//! A pod reconciliation builds one options resolver from the pod's
//! annotations, reconciles every container independently and folds the
//! failures into a single [`PodSyncError`]. Containers are driven through an
//! ordered buffered stream: with a concurrency above one they are checked in
//! parallel, but failures are always reported in declaration order.

mod error;


pub use error::{ContainerError, PodSyncError};

use crate::checker::{CheckError, VersionChecker};
use crate::config::SyncConfig;
use crate::models::{CheckResult, MetricsEntry, PodRef};
use crate::observability::{self, ContainerOutcome, SyncMetrics};
use crate::options::{AnnotationResolverFactory, Options, OptionsResolver, ResolverFactory};
use crate::store::MetricsStore;
use futures_util::stream::{self, StreamExt};
use k8s_openapi::api::core::v1::{Container, Pod};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

/// Reconciles pods against the version checker and the metrics store
pub struct Reconciler {
    checker: Arc<dyn VersionChecker>,
    store: Arc<dyn MetricsStore>,
    resolvers: Arc<dyn ResolverFactory>,
    /// Enablement default for containers without an enable annotation
    default_test_all: bool,
    check_timeout: Option<Duration>,
    concurrency: usize,
    metrics: SyncMetrics,
}

impl Reconciler {
    /// Create a reconciler from explicit collaborators and configuration
    pub fn new(
        checker: Arc<dyn VersionChecker>,
        store: Arc<dyn MetricsStore>,
        resolvers: Arc<dyn ResolverFactory>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            checker,
            store,
            resolvers,
            default_test_all: config.default_test_all,
            check_timeout: config.check_timeout(),
            concurrency: config.concurrency(),
            metrics: SyncMetrics::new(),
        }
    }

    /// Reconcile every container of the pod.
    ///
    /// Every container is attempted even after earlier failures. Cancelling
    /// `cancel` fails the checks that are still running.
    pub async fn reconcile(
        &self,
        cancel: &CancellationToken,
        pod: &Pod,
    ) -> Result<(), PodSyncError> {
        let pod_ref = PodRef::from_pod(pod);
        let span = info_span!(
            "reconcile_pod",
            namespace = %pod_ref.namespace,
            pod = %pod_ref.name
        );

        self.reconcile_pod(cancel, pod, pod_ref).instrument(span).await
    }

    async fn reconcile_pod(
        &self,
        cancel: &CancellationToken,
        pod: &Pod,
        pod_ref: PodRef<'_>,
    ) -> Result<(), PodSyncError> {
        let start = Instant::now();

        let no_annotations = BTreeMap::new();
        let annotations = pod.metadata.annotations.as_ref().unwrap_or(&no_annotations);
        let resolver = self.resolvers.resolver(annotations);

        let containers = pod
            .spec
            .as_ref()
            .map(|spec| spec.containers.as_slice())
            .unwrap_or_default();

        let outcomes: Vec<Result<(), ContainerError>> = stream::iter(containers)
            .map(|container| {
                self.reconcile_container(cancel, pod, pod_ref, container, resolver.as_ref())
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let failures: Vec<ContainerError> = outcomes
            .into_iter()
            .filter_map(|outcome| outcome.err())
            .collect();

        let result = if failures.is_empty() {
            Ok(())
        } else {
            Err(PodSyncError {
                namespace: pod_ref.namespace.to_string(),
                name: pod_ref.name.to_string(),
                failures,
            })
        };

        self.metrics
            .observe_pod(result.is_ok(), start.elapsed().as_secs_f64());
        if let Err(err) = &result {
            observability::log_pod_sync_failed(err);
        }

        result
    }

    /// Reconcile one container: enablement, options, check, classification
    async fn reconcile_container(
        &self,
        cancel: &CancellationToken,
        pod: &Pod,
        pod_ref: PodRef<'_>,
        container: &Container,
        resolver: &dyn OptionsResolver,
    ) -> Result<(), ContainerError> {
        let name = container.name.as_str();
        let span = info_span!("reconcile_container", container = %name);

        async move {
            if !resolver.is_enabled(self.default_test_all, name) {
                observability::log_container_disabled(pod_ref, name);
                self.store
                    .remove_image(pod_ref.namespace, pod_ref.name, name);
                self.metrics
                    .inc_container_outcome(ContainerOutcome::Disabled);
                return Ok(());
            }

            let options = match resolver.options(name) {
                Ok(options) => options,
                Err(source) => {
                    self.metrics
                        .inc_container_outcome(ContainerOutcome::ConfigurationError);
                    return Err(ContainerError::Configuration {
                        container: name.to_string(),
                        source,
                    });
                }
            };

            debug!(image = ?container.image, "Processing container image");

            match self.check_container(cancel, pod, pod_ref, container, &options).await {
                Ok(outcome) => {
                    self.metrics.inc_container_outcome(outcome);
                    Ok(())
                }
                // Expected and recurring: logged loudly, not a failure.
                Err(err) if err.is_no_version_found() => {
                    observability::log_no_version_found(pod_ref, name, &err);
                    self.metrics
                        .inc_container_outcome(ContainerOutcome::NoVersionFound);
                    Ok(())
                }
                Err(source) => {
                    self.metrics
                        .inc_container_outcome(ContainerOutcome::CheckFailed);
                    Err(ContainerError::Check {
                        container: name.to_string(),
                        source,
                    })
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Run the check and write a produced result to the metrics store.
    ///
    /// Checker errors are returned unchanged for the caller to classify.
    async fn check_container(
        &self,
        cancel: &CancellationToken,
        pod: &Pod,
        pod_ref: PodRef<'_>,
        container: &Container,
        options: &Options,
    ) -> Result<ContainerOutcome, CheckError> {
        let Some(result) = self.run_check(cancel, pod, container, options).await? else {
            debug!("No check result available yet");
            return Ok(ContainerOutcome::Pending);
        };

        observability::log_image_checked(pod_ref, &container.name, &result);
        self.store
            .add_image(MetricsEntry::from_result(pod_ref, &container.name, &result));

        Ok(ContainerOutcome::Recorded)
    }

    /// Invoke the checker, bounded by the cancellation token and the deadline
    async fn run_check(
        &self,
        cancel: &CancellationToken,
        pod: &Pod,
        container: &Container,
        options: &Options,
    ) -> Result<Option<CheckResult>, CheckError> {
        let check = async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(CheckError::Cancelled),
                result = self.checker.check(cancel, pod, container, options) => result,
            }
        };

        match self.check_timeout {
            Some(deadline) => tokio::time::timeout(deadline, check)
                .await
                .unwrap_or_else(|_| Err(CheckError::DeadlineExceeded(deadline))),
            None => check.await,
        }
    }
}

/// Builder for creating a reconciler
pub struct ReconcilerBuilder {
    checker: Option<Arc<dyn VersionChecker>>,
    store: Option<Arc<dyn MetricsStore>>,
    resolvers: Arc<dyn ResolverFactory>,
    config: SyncConfig,
    check_timeout: Option<Duration>,
}

impl ReconcilerBuilder {
    /// Create a new builder with default configuration and the annotation resolver
    pub fn new() -> Self {
        Self {
            checker: None,
            store: None,
            resolvers: Arc::new(AnnotationResolverFactory),
            config: SyncConfig::default(),
            check_timeout: None,
        }
    }

    /// Set the version checker
    pub fn checker(mut self, checker: Arc<dyn VersionChecker>) -> Self {
        self.checker = Some(checker);
        self
    }

    /// Set the metrics store
    pub fn store(mut self, store: Arc<dyn MetricsStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the options resolver factory
    pub fn resolvers(mut self, resolvers: Arc<dyn ResolverFactory>) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// Take all settings from a loaded configuration
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the enablement default
    pub fn default_test_all(mut self, enabled: bool) -> Self {
        self.config.default_test_all = enabled;
        self
    }

    /// Set the per-check deadline, overriding the configured one
    pub fn check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = Some(timeout);
        self
    }

    /// Set how many containers of a pod are checked at the same time
    pub fn max_concurrent_checks(mut self, max: usize) -> Self {
        self.config.max_concurrent_checks = max;
        self
    }

    /// Build the reconciler
    pub fn build(self) -> anyhow::Result<Reconciler> {
        let checker = self
            .checker
            .ok_or_else(|| anyhow::anyhow!("Version checker is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Metrics store is required"))?;

        let mut reconciler = Reconciler::new(checker, store, self.resolvers, &self.config);
        if self.check_timeout.is_some() {
            reconciler.check_timeout = self.check_timeout;
        }

        Ok(reconciler)
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
