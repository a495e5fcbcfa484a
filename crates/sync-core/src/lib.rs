//! Image version sync core
//!
//! This crate turns a Kubernetes pod into per-container version check
//! decisions and keeps a metrics store in line with the results:
//! - Per-container enablement and options resolution from annotations
//! - Version checks through a pluggable checker
//! - Outcome classification and aggregate pod-level failures
//! - Prometheus-backed image metrics and process observability

pub mod checker;
pub mod config;
pub mod models;
pub mod observability;
pub mod options;
pub mod reconciler;
pub mod store;

pub use checker::{CheckError, VersionChecker};
pub use crate::config::SyncConfig;
pub use models::*;
pub use observability::SyncMetrics;
pub use options::{
    AnnotationIssue, AnnotationResolver, AnnotationResolverFactory, Options, OptionsError,
    OptionsResolver, ResolverFactory,
};
pub use reconciler::{ContainerError, PodSyncError, Reconciler, ReconcilerBuilder};
pub use store::{MetricsStore, PrometheusStore};
