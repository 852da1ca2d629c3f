//! Cloud provider contract for CostHawk.
//!
//! [`CloudProvider`] is the seam between the analyzer and the account being
//! analyzed. Two implementations ship with the crate:
//!
//! - [`FixtureCloud`]: in-memory (optionally JSON-loaded) account data
//! - `AwsCloud`: the live AWS SDK backend, behind the `aws` feature
//!
//! On top of the provider sit the [`MetricClient`], which folds raw
//! datapoints into [`MetricStatistics`](hawk_proto::MetricStatistics) and
//! never fails, and the [`RegionScanner`], which never fails either.

#![forbid(unsafe_code)]

#[cfg(feature = "aws")]
pub mod aws;
pub mod fixture;
pub mod metrics;
pub mod regions;

#[cfg(feature = "aws")]
pub use aws::AwsCloud;
pub use fixture::{FailureKind, FixtureCall, FixtureCloud, FixtureData, FixtureOp, RegionInventory};
pub use metrics::{MetricClient, fold_datapoints};
pub use regions::{FALLBACK_REGIONS, RegionScan, RegionScanner};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use hawk_proto::{
    AwsCredentials, CallerIdentity, Datapoint, EbsVolume, Ec2Instance, Ec2State, LambdaFunction,
    RdsInstance, Snapshot,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloudError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("credentials expired: {0}")]
    ExpiredCredentials(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("throttled: {0}")]
    Throttled(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("upstream error: {0}")]
    Upstream(String),
}

pub type CloudResult<T> = Result<T, CloudError>;

impl CloudError {
    /// Classify a provider error code (e.g. `InvalidClientTokenId`) and message.
    pub fn from_code(code: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        let code = code.unwrap_or_default();
        match code {
            "UnrecognizedClientException"
            | "InvalidClientTokenId"
            | "SignatureDoesNotMatch"
            | "AuthFailure"
            | "InvalidAccessKeyId" => Self::InvalidCredentials(message),
            "ExpiredToken" | "ExpiredTokenException" | "RequestExpired" => {
                Self::ExpiredCredentials(message)
            }
            "AccessDenied" | "AccessDeniedException" | "UnauthorizedOperation" => {
                Self::AccessDenied(message)
            }
            "Throttling" | "ThrottlingException" | "RequestLimitExceeded"
            | "TooManyRequestsException" => Self::Throttled(message),
            c if c.contains("NotFound") => Self::NotFound(message),
            _ if message.to_lowercase().contains("security token") => {
                Self::InvalidCredentials(message)
            }
            _ => Self::Upstream(message),
        }
    }

    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials(_) | Self::ExpiredCredentials(_)
        )
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied(_))
    }
}

// ─── Request / Response Types ─────────────────────────────────────────────────

/// Credentials plus the region a call is made against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub credentials: AwsCredentials,
    pub region: String,
}

impl Scope {
    pub fn new(credentials: AwsCredentials, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
        }
    }

    /// Same credentials, another region.
    pub fn in_region(&self, region: impl Into<String>) -> Self {
        Self {
            credentials: self.credentials.clone(),
            region: region.into(),
        }
    }
}

/// A single-dimension statistics query.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricQuery {
    pub namespace: String,
    pub metric_name: String,
    pub dimension_name: String,
    pub resource_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period_secs: i32,
}

/// A billing window, `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Spend for one billing window, grouped by service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CostPeriod {
    /// Ungrouped total, when the provider reports one.
    pub total: Option<f64>,
    #[serde(default)]
    pub groups: BTreeMap<String, f64>,
}

impl CostPeriod {
    pub fn amount(&self) -> f64 {
        self.total.unwrap_or_else(|| self.groups.values().sum())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopResult {
    pub instance_id: String,
    pub previous_state: Ec2State,
    pub current_state: Ec2State,
}

// ─── Provider Trait ───────────────────────────────────────────────────────────

#[async_trait]
pub trait CloudProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Cheapest identity check available.
    async fn validate_credentials(&self, scope: &Scope) -> CloudResult<CallerIdentity>;

    async fn list_regions(&self, scope: &Scope) -> CloudResult<Vec<String>>;

    async fn list_instances(&self, scope: &Scope) -> CloudResult<Vec<Ec2Instance>>;

    async fn list_volumes(&self, scope: &Scope) -> CloudResult<Vec<EbsVolume>>;

    /// Snapshots owned by the account.
    async fn list_snapshots(&self, scope: &Scope) -> CloudResult<Vec<Snapshot>>;

    async fn list_functions(&self, scope: &Scope) -> CloudResult<Vec<LambdaFunction>>;

    async fn list_databases(&self, scope: &Scope) -> CloudResult<Vec<RdsInstance>>;

    /// Raw datapoints; an empty vector means no data.
    async fn metric_datapoints(&self, scope: &Scope, query: &MetricQuery)
    -> CloudResult<Vec<Datapoint>>;

    async fn stop_instance(&self, scope: &Scope, instance_id: &str) -> CloudResult<StopResult>;

    async fn cost_and_usage(&self, scope: &Scope, period: DateRange) -> CloudResult<CostPeriod>;

    async fn cost_forecast(&self, scope: &Scope, period: DateRange) -> CloudResult<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(matches!(
            CloudError::from_code(Some("InvalidClientTokenId"), "bad"),
            CloudError::InvalidCredentials(_)
        ));
        assert!(matches!(
            CloudError::from_code(Some("ExpiredToken"), "old"),
            CloudError::ExpiredCredentials(_)
        ));
        assert!(matches!(
            CloudError::from_code(Some("AccessDeniedException"), "no"),
            CloudError::AccessDenied(_)
        ));
        assert!(matches!(
            CloudError::from_code(Some("InvalidInstanceID.NotFound"), "gone"),
            CloudError::NotFound(_)
        ));
        assert!(matches!(
            CloudError::from_code(None, "The security token included in the request is invalid"),
            CloudError::InvalidCredentials(_)
        ));
        assert!(matches!(
            CloudError::from_code(Some("InternalError"), "boom"),
            CloudError::Upstream(_)
        ));
    }

    #[test]
    fn test_credential_error_predicate() {
        assert!(CloudError::ExpiredCredentials("x".into()).is_credential_error());
        assert!(!CloudError::AccessDenied("x".into()).is_credential_error());
        assert!(CloudError::AccessDenied("x".into()).is_access_denied());
    }

    #[test]
    fn test_cost_period_amount_prefers_total() {
        let mut period = CostPeriod::default();
        period.groups.insert("EC2".to_string(), 10.0);
        period.groups.insert("S3".to_string(), 2.5);
        assert_eq!(period.amount(), 12.5);
        period.total = Some(20.0);
        assert_eq!(period.amount(), 20.0);
    }

    #[test]
    fn test_scope_in_region_keeps_credentials() {
        let scope = Scope::new(AwsCredentials::new("AKIA", "s"), "us-east-1");
        let other = scope.in_region("eu-west-1");
        assert_eq!(other.region, "eu-west-1");
        assert_eq!(other.credentials, scope.credentials);
    }
}
