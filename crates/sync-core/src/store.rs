//! Image metrics store
//!
//! Holds at most one live entry per (namespace, pod, container) and publishes
//! it as a Prometheus gauge. Version strings are part of the label set, so an
//! upsert retracts the previously published series before setting the new one.

use crate::models::{ImageKey, MetricsEntry};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tracing::debug;

/// Gauge name for the per-image "is latest" series
const IS_LATEST_METRIC: &str = "version_checker_is_latest_version";

const IS_LATEST_LABELS: [&str; 8] = [
    "namespace",
    "pod",
    "container",
    "image",
    "current_version",
    "latest_version",
    "os",
    "arch",
];

/// Trait for metrics store implementations
///
/// Both operations must be idempotent and safe to call concurrently from
/// reconciliations of different pods.
pub trait MetricsStore: Send + Sync {
    /// Insert or overwrite the entry for the entry's (namespace, pod, container)
    fn add_image(&self, entry: MetricsEntry);

    /// Remove the entry for (namespace, pod, container), if any
    fn remove_image(&self, namespace: &str, pod: &str, container: &str);
}

/// Prometheus-backed metrics store
pub struct PrometheusStore {
    registry: Registry,
    is_latest: GaugeVec,
    entries: DashMap<ImageKey, MetricsEntry>,
}

impl PrometheusStore {
    /// Create a store with its own registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let is_latest = GaugeVec::new(
            Opts::new(
                IS_LATEST_METRIC,
                "Whether the container image is running the latest version (1) or not (0)",
            ),
            &IS_LATEST_LABELS,
        )?;
        registry.register(Box::new(is_latest.clone()))?;

        Ok(Self {
            registry,
            is_latest,
            entries: DashMap::new(),
        })
    }

    /// Registry holding the image series, for exposition alongside other metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode the image series in the Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Current entry for a container, if one is live
    pub fn entry(&self, namespace: &str, pod: &str, container: &str) -> Option<MetricsEntry> {
        self.entries
            .get(&ImageKey::new(namespace, pod, container))
            .map(|r| r.clone())
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn publish(&self, entry: &MetricsEntry) {
        let value = if entry.is_latest { 1.0 } else { 0.0 };
        self.is_latest
            .with_label_values(&label_values(entry))
            .set(value);
    }

    fn retract(&self, entry: &MetricsEntry) {
        if let Err(e) = self.is_latest.remove_label_values(&label_values(entry)) {
            debug!(
                namespace = %entry.namespace,
                pod = %entry.pod,
                container = %entry.container,
                error = %e,
                "Image series already absent"
            );
        }
    }
}

impl MetricsStore for PrometheusStore {
    fn add_image(&self, entry: MetricsEntry) {
        // The map shard stays locked while the series is swapped.
        match self.entries.entry(entry.key()) {
            Entry::Occupied(mut occupied) => {
                if label_values(occupied.get()) != label_values(&entry) {
                    self.retract(occupied.get());
                }
                self.publish(&entry);
                occupied.insert(entry);
            }
            Entry::Vacant(vacant) => {
                self.publish(&entry);
                vacant.insert(entry);
            }
        }
    }

    fn remove_image(&self, namespace: &str, pod: &str, container: &str) {
        if let Some((_, previous)) = self
            .entries
            .remove(&ImageKey::new(namespace, pod, container))
        {
            self.retract(&previous);
        }
    }
}

fn label_values(entry: &MetricsEntry) -> [&str; 8] {
    [
        entry.namespace.as_str(),
        entry.pod.as_str(),
        entry.container.as_str(),
        entry.image_url.as_str(),
        entry.current_version.as_str(),
        entry.latest_version.as_str(),
        entry.os.as_str(),
        entry.arch.as_str(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(container: &str, current: &str, latest: &str) -> MetricsEntry {
        MetricsEntry {
            namespace: "apps".to_string(),
            pod: "web-0".to_string(),
            container: container.to_string(),
            image_url: "repo/img".to_string(),
            is_latest: current == latest,
            current_version: current.to_string(),
            latest_version: latest.to_string(),
            os: "linux".to_string(),
            arch: "amd64".to_string(),
        }
    }

    fn series_count(store: &PrometheusStore) -> usize {
        store
            .registry()
            .gather()
            .iter()
            .filter(|family| family.get_name() == IS_LATEST_METRIC)
            .map(|family| family.get_metric().len())
            .sum()
    }

    #[test]
    fn test_add_image_publishes_series() {
        let store = PrometheusStore::new().unwrap();
        store.add_image(entry("app", "1.2.0", "1.3.0"));

        assert_eq!(store.len(), 1);
        assert_eq!(series_count(&store), 1);

        let rendered = store.render().unwrap();
        assert!(rendered.contains(IS_LATEST_METRIC));
        assert!(rendered.contains("current_version=\"1.2.0\""));
        assert!(rendered.contains("latest_version=\"1.3.0\""));
    }

    #[test]
    fn test_add_image_is_idempotent() {
        let store = PrometheusStore::new().unwrap();
        store.add_image(entry("app", "1.2.0", "1.3.0"));
        store.add_image(entry("app", "1.2.0", "1.3.0"));

        assert_eq!(store.len(), 1);
        assert_eq!(series_count(&store), 1);
    }

    #[test]
    fn test_add_image_overwrites_previous_series() {
        let store = PrometheusStore::new().unwrap();
        store.add_image(entry("app", "1.2.0", "1.3.0"));
        store.add_image(entry("app", "1.3.0", "1.3.0"));

        assert_eq!(series_count(&store), 1);
        let current = store.entry("apps", "web-0", "app").unwrap();
        assert!(current.is_latest);

        let rendered = store.render().unwrap();
        assert!(!rendered.contains("current_version=\"1.2.0\""));
    }

    #[test]
    fn test_remove_image_is_idempotent() {
        let store = PrometheusStore::new().unwrap();
        store.add_image(entry("app", "1.2.0", "1.3.0"));
        store.add_image(entry("sidecar", "2.0.0", "2.0.0"));

        store.remove_image("apps", "web-0", "app");
        store.remove_image("apps", "web-0", "app");

        assert_eq!(store.len(), 1);
        assert_eq!(series_count(&store), 1);
        assert!(store.entry("apps", "web-0", "app").is_none());
        assert!(store.entry("apps", "web-0", "sidecar").is_some());
    }

    #[test]
    fn test_remove_unknown_image() {
        let store = PrometheusStore::new().unwrap();
        store.remove_image("apps", "web-0", "app");

        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_upserts_on_disjoint_keys() {
        let store = PrometheusStore::new().unwrap();

        std::thread::scope(|scope| {
            for i in 0..8 {
                let store = &store;
                scope.spawn(move || {
                    let name = format!("container-{}", i);
                    store.add_image(entry(&name, "1.0.0", "1.1.0"));
                    store.add_image(entry(&name, "1.1.0", "1.1.0"));
                });
            }
        });

        assert_eq!(store.len(), 8);
        assert_eq!(series_count(&store), 8);
    }
}
