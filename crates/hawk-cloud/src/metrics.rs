//! Statistics over a trailing window, folded from hourly buckets.

use crate::{CloudProvider, MetricQuery, Scope};
use chrono::{DateTime, Duration, Utc};
use hawk_proto::{Datapoint, MetricStatistics};
use tracing::{debug, warn};

/// Bucket size for window statistics.
pub const HOURLY_PERIOD_SECS: i32 = 3600;

/// Bucket size and lookback for [`MetricClient::latest_value`].
pub const LATEST_PERIOD_SECS: i32 = 60;
pub const LATEST_LOOKBACK_MINS: i64 = 10;

pub mod namespace {
    pub const EC2: &str = "AWS/EC2";
    pub const EBS: &str = "AWS/EBS";
    pub const LAMBDA: &str = "AWS/Lambda";
    pub const RDS: &str = "AWS/RDS";
}

pub mod dimension {
    pub const INSTANCE_ID: &str = "InstanceId";
    pub const VOLUME_ID: &str = "VolumeId";
    pub const FUNCTION_NAME: &str = "FunctionName";
    pub const DB_INSTANCE_ID: &str = "DBInstanceIdentifier";
}

/// Fold hourly buckets into window statistics.
///
/// `average` is the mean of the per-bucket averages, not a sample-weighted
/// mean. Buckets with differing sample counts are weighted equally; savings
/// estimates depend on this figure, so it is kept as is.
pub fn fold_datapoints(points: &[Datapoint]) -> MetricStatistics {
    if points.is_empty() {
        return MetricStatistics::default();
    }
    let n = points.len() as f64;
    let average = points.iter().map(|p| p.average.unwrap_or(0.0)).sum::<f64>() / n;
    let maximum = points
        .iter()
        .map(|p| p.maximum.unwrap_or(0.0))
        .fold(f64::NEG_INFINITY, f64::max);
    let minimum = points
        .iter()
        .map(|p| p.minimum.unwrap_or(0.0))
        .fold(f64::INFINITY, f64::min);
    let sum = points.iter().map(|p| p.sum.unwrap_or(0.0)).sum();

    MetricStatistics {
        average,
        maximum,
        minimum,
        sum,
        sample_count: points.len() as u32,
    }
}

/// Borrowing wrapper around a provider's raw metric call.
///
/// Every method returns a value: provider errors and empty windows both come
/// back as zeroed statistics with `sample_count == 0`.
pub struct MetricClient<'a> {
    provider: &'a dyn CloudProvider,
    scope: &'a Scope,
    now: DateTime<Utc>,
}

impl<'a> MetricClient<'a> {
    pub fn new(provider: &'a dyn CloudProvider, scope: &'a Scope) -> Self {
        Self {
            provider,
            scope,
            now: Utc::now(),
        }
    }

    /// Pin the end of every query window.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub async fn get_statistic(
        &self,
        namespace: &str,
        metric_name: &str,
        resource_id: &str,
        window_days: i64,
        dimension_name: &str,
    ) -> MetricStatistics {
        let query = MetricQuery {
            namespace: namespace.to_string(),
            metric_name: metric_name.to_string(),
            dimension_name: dimension_name.to_string(),
            resource_id: resource_id.to_string(),
            start: self.now - Duration::days(window_days),
            end: self.now,
            period_secs: HOURLY_PERIOD_SECS,
        };

        match self.provider.metric_datapoints(self.scope, &query).await {
            Ok(points) => {
                let stats = fold_datapoints(&points);
                debug!(
                    namespace,
                    metric = metric_name,
                    resource = resource_id,
                    samples = stats.sample_count,
                    "metric window folded"
                );
                stats
            }
            Err(e) => {
                warn!(
                    namespace,
                    metric = metric_name,
                    resource = resource_id,
                    error = %e,
                    "metric fetch failed, treating as no data"
                );
                MetricStatistics::default()
            }
        }
    }

    /// The average of the most recent bucket in the last few minutes.
    pub async fn latest_value(
        &self,
        namespace: &str,
        metric_name: &str,
        resource_id: &str,
        dimension_name: &str,
    ) -> Option<f64> {
        let query = MetricQuery {
            namespace: namespace.to_string(),
            metric_name: metric_name.to_string(),
            dimension_name: dimension_name.to_string(),
            resource_id: resource_id.to_string(),
            start: self.now - Duration::minutes(LATEST_LOOKBACK_MINS),
            end: self.now,
            period_secs: LATEST_PERIOD_SECS,
        };

        match self.provider.metric_datapoints(self.scope, &query).await {
            Ok(points) => points
                .iter()
                .max_by_key(|p| p.timestamp)
                .and_then(|p| p.average),
            Err(e) => {
                warn!(resource = resource_id, error = %e, "latest metric fetch failed");
                None
            }
        }
    }
}
