//! Reconciliation failures

use crate::checker::CheckError;
use crate::options::OptionsError;
use thiserror::Error;

/// Failure of a single container's reconciliation
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Annotations could not be resolved into options. Retrying cannot help
    /// until the pod spec changes.
    #[error("failed to build options from annotations for {container:?}: {source}")]
    Configuration {
        container: String,
        #[source]
        source: OptionsError,
    },

    /// The version check failed, was cancelled or ran out of time
    #[error("failed to check container image {container:?}: {source}")]
    Check {
        container: String,
        #[source]
        source: CheckError,
    },
}

impl ContainerError {
    /// Name of the failing container
    pub fn container(&self) -> &str {
        match self {
            ContainerError::Configuration { container, .. }
            | ContainerError::Check { container, .. } => container,
        }
    }

    /// Whether re-running the reconciliation later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ContainerError::Check { .. })
    }
}

/// Aggregate failure of a pod reconciliation
///
/// Holds every failing container in declaration order; the joined message is
/// only produced by `Display`.
#[derive(Debug, Error)]
#[error("failed to sync pod {}/{}: {}", .namespace, .name, join_failures(.failures))]
pub struct PodSyncError {
    pub namespace: String,
    pub name: String,
    pub failures: Vec<ContainerError>,
}

impl PodSyncError {
    /// Whether any failure may clear up on a later attempt
    pub fn is_retryable(&self) -> bool {
        self.failures.iter().any(ContainerError::is_retryable)
    }

    /// Names of the failing containers, in declaration order
    pub fn failed_containers(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(ContainerError::container)
    }
}

fn join_failures(failures: &[ContainerError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
