//! Version checker boundary
//!
//! The checker owns registry access and version comparison. This crate only
//! consumes it: a check yields a result, no result yet, a "no version found"
//! classification, or a failure.

use crate::models::CheckResult;
use crate::options::Options;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, Pod};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors returned by a version check
#[derive(Debug, Error)]
pub enum CheckError {
    /// The search completed but no version satisfied the configured criteria
    #[error("no version found matching search criteria for image {image:?}")]
    NoVersionFound { image: String },

    /// The caller cancelled the reconciliation
    #[error("version check cancelled")]
    Cancelled,

    /// The check did not finish within the configured deadline
    #[error("version check exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),

    /// Registry, auth, manifest parsing or any other checker failure
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CheckError {
    /// Returns true for the expected, recurring "no version found" outcome
    pub fn is_no_version_found(&self) -> bool {
        matches!(self, CheckError::NoVersionFound { .. })
    }

    /// Returns true if the check was stopped by cancellation or deadline
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CheckError::Cancelled | CheckError::DeadlineExceeded(_))
    }
}

/// Trait for image version checking implementations
#[async_trait]
pub trait VersionChecker: Send + Sync {
    /// Check the container's image against its resolved options.
    ///
    /// Returns `Ok(None)` when no conclusion is available yet. Implementations
    /// should stop work and return [`CheckError::Cancelled`] once `cancel`
    /// fires.
    async fn check(
        &self,
        cancel: &CancellationToken,
        pod: &Pod,
        container: &Container,
        options: &Options,
    ) -> Result<Option<CheckResult>, CheckError>;
}
