//! Underutilization detection and savings estimation.
//!
//! Five resource collectors (EC2, EBS, snapshots, Lambda, RDS) and a cost
//! collector run concurrently under the [`Analyzer`], which validates
//! credentials first, falls back across regions when the primary region has
//! no instances, and assembles one [`AnalysisReport`](hawk_proto::AnalysisReport).
//!
//! Each collector module exposes pure `classify*` functions over inventory
//! items and window statistics, plus an async `collect` that fetches both.

#![forbid(unsafe_code)]

pub mod analyzer;
pub mod cost;
pub mod ebs;
pub mod ec2;
pub mod lambda;
pub mod pricing;
pub mod rds;
pub mod sizing;
pub mod snapshot;

pub use analyzer::{Analyzer, AnalyzerConfig};

use hawk_cloud::CloudError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("invalid AWS credentials, check the access key id and secret access key ({0})")]
    InvalidCredentials(String),

    #[error("AWS credentials have expired, generate new keys ({0})")]
    ExpiredCredentials(String),

    #[error("credential validation failed: {0}")]
    Validation(String),

    #[error("the credentials lack permission to read any resource inventory: {0}")]
    PermissionDenied(String),

    #[error("AWS could not be reached for any resource inventory: {0}")]
    Upstream(String),
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

impl AnalysisError {
    pub fn from_validation(err: CloudError) -> Self {
        match err {
            CloudError::InvalidCredentials(m) => Self::InvalidCredentials(m),
            CloudError::ExpiredCredentials(m) => Self::ExpiredCredentials(m),
            other => Self::Validation(other.to_string()),
        }
    }

    /// Called when every inventory collector failed.
    pub fn from_collector_errors(errors: &[CloudError]) -> Self {
        let detail = errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no collector results".to_string());
        if let Some(cred) = errors.iter().find(|e| e.is_credential_error()) {
            return Self::from_validation(cred.clone());
        }
        if !errors.is_empty() && errors.iter().all(CloudError::is_access_denied) {
            Self::PermissionDenied(detail)
        } else {
            Self::Upstream(detail)
        }
    }

    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials(_) | Self::ExpiredCredentials(_)
        )
    }
}
