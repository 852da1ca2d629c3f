//! Snapshot collector.

use crate::pricing::SNAPSHOT_PER_GB_MONTHLY;
use chrono::{DateTime, Utc};
use hawk_cloud::{CloudProvider, CloudResult, Scope};
use hawk_proto::{Finding, FindingRule, ResourceKind, ResourceSection, Snapshot, UsageMetrics, round2};
use tracing::info;

pub const MAX_AGE_DAYS: i64 = 90;

/// Whole days since `started_at`, floored.
pub fn age_days(started_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - started_at).num_days()
}

/// Flag snapshots older than [`MAX_AGE_DAYS`]. Snapshots without a start
/// time are skipped.
pub fn classify(snapshot: &Snapshot, now: DateTime<Utc>) -> Option<Finding> {
    let started_at = snapshot.started_at?;
    if now - started_at <= chrono::Duration::days(MAX_AGE_DAYS) {
        return None;
    }
    let age = age_days(started_at, now);
    Some(Finding {
        kind: ResourceKind::Snapshot,
        resource_id: snapshot.snapshot_id.clone(),
        resource_type: None,
        name: snapshot.description.clone(),
        rule: FindingRule::OldSnapshot,
        usage: UsageMetrics::Snapshot {
            size_gb: snapshot.size_gb,
            age_days: age,
        },
        reason: format!("Snapshot is {age} days old (over {MAX_AGE_DAYS} days)."),
        estimated_monthly_savings: round2(f64::from(snapshot.size_gb) * SNAPSHOT_PER_GB_MONTHLY),
        recommendation: "Review whether it is still needed and delete it if not".to_string(),
    })
}

pub async fn collect(
    provider: &dyn CloudProvider,
    scope: &Scope,
    now: DateTime<Utc>,
) -> CloudResult<ResourceSection<Snapshot>> {
    let snapshots = provider.list_snapshots(scope).await?;
    let findings: Vec<Finding> = snapshots.iter().filter_map(|s| classify(s, now)).collect();
    info!(
        region = %scope.region,
        total = snapshots.len(),
        flagged = findings.len(),
        "snapshots collected"
    );
    Ok(ResourceSection {
        inventory: snapshots,
        findings,
    })
}
