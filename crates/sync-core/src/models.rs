//! Core data models for the version sync pipeline

use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};

/// Namespace used when a pod carries none
const DEFAULT_NAMESPACE: &str = "default";

/// Identity of the pod being reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PodRef<'a> {
    pub namespace: &'a str,
    pub name: &'a str,
}

impl<'a> PodRef<'a> {
    /// Extract the identity from pod metadata
    pub fn from_pod(pod: &'a Pod) -> Self {
        Self {
            namespace: pod
                .metadata
                .namespace
                .as_deref()
                .unwrap_or(DEFAULT_NAMESPACE),
            name: pod.metadata.name.as_deref().unwrap_or_default(),
        }
    }
}

impl std::fmt::Display for PodRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Outcome of a completed version check for one container image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub image_url: String,
    pub current_version: String,
    pub latest_version: String,
    pub is_latest: bool,
    pub os: String,
    pub architecture: String,
}

/// Metrics store projection of a check result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsEntry {
    pub namespace: String,
    pub pod: String,
    pub container: String,
    pub image_url: String,
    pub is_latest: bool,
    pub current_version: String,
    pub latest_version: String,
    pub os: String,
    pub arch: String,
}

impl MetricsEntry {
    /// Build the entry for a container of the given pod
    pub fn from_result(pod: PodRef<'_>, container: &str, result: &CheckResult) -> Self {
        Self {
            namespace: pod.namespace.to_string(),
            pod: pod.name.to_string(),
            container: container.to_string(),
            image_url: result.image_url.clone(),
            is_latest: result.is_latest,
            current_version: result.current_version.clone(),
            latest_version: result.latest_version.clone(),
            os: result.os.clone(),
            arch: result.architecture.clone(),
        }
    }

    /// Store key for this entry
    pub fn key(&self) -> ImageKey {
        ImageKey::new(&self.namespace, &self.pod, &self.container)
    }
}

/// Metrics store key: one live entry per (namespace, pod, container)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey {
    pub namespace: String,
    pub pod: String,
    pub container: String,
}

impl ImageKey {
    pub fn new(namespace: &str, pod: &str, container: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            container: container.to_string(),
        }
    }
}
