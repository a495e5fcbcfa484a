//! Per-container check options
//!
//! Options are resolved fresh for every (pod, container) pair from the pod's
//! annotations. A resolver is built once per pod and shared by all of its
//! containers.

mod annotations;

pub use annotations::{keys, AnnotationResolver, AnnotationResolverFactory};

use regex::Regex;
use std::collections::BTreeMap;
use thiserror::Error;

/// Resolved check configuration for a single container
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Registry URL to query instead of the one in the image reference
    pub override_url: Option<String>,
    /// Compare image digests instead of tags
    pub use_sha: bool,
    /// Allow tags carrying semver metadata or pre-release suffixes
    pub use_metadata: bool,
    /// Only consider tags matching this expression
    pub match_regex: Option<Regex>,
    pub pin_major: Option<u64>,
    pub pin_minor: Option<u64>,
    pub pin_patch: Option<u64>,
    /// Resolve a digest-only image reference back to its tags
    pub resolve_sha_to_tags: bool,
}

/// A single problem found while resolving annotations
#[derive(Debug, Error)]
pub enum AnnotationIssue {
    #[error("{key}: {value:?} is not a valid boolean")]
    InvalidBool { key: String, value: String },

    #[error("{key}: {value:?} is not a valid unsigned integer")]
    InvalidPin { key: String, value: String },

    #[error("{key}: invalid regular expression: {source}")]
    InvalidRegex {
        key: String,
        #[source]
        source: regex::Error,
    },

    #[error("{key}: cannot be combined with {conflicts_with}")]
    Conflict { key: String, conflicts_with: String },

    #[error("{key}: requires {requires} to be set")]
    MissingDependency { key: String, requires: String },
}

/// Annotation values could not be turned into [`Options`]
#[derive(Debug, Error)]
#[error("failed to build version options: {}", join_issues(.issues))]
pub struct OptionsError {
    pub issues: Vec<AnnotationIssue>,
}

impl OptionsError {
    pub fn new(issues: Vec<AnnotationIssue>) -> Self {
        Self { issues }
    }
}

fn join_issues(issues: &[AnnotationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolves enablement and options for the containers of one pod
pub trait OptionsResolver: Send + Sync {
    /// Whether checking is enabled for the container, given the process-wide default
    fn is_enabled(&self, default_enabled: bool, container: &str) -> bool;

    /// Structured options for the container
    fn options(&self, container: &str) -> Result<Options, OptionsError>;
}

/// Builds a resolver scoped to a pod's annotations
pub trait ResolverFactory: Send + Sync {
    fn resolver(&self, annotations: &BTreeMap<String, String>) -> Box<dyn OptionsResolver>;
}
