//! Analysis orchestration: validate, collect concurrently, fall back across
//! regions, aggregate.

use crate::{AnalysisError, AnalysisResult, cost, ebs, ec2, lambda, rds, snapshot};
use chrono::{DateTime, Utc};
use hawk_cloud::{CloudError, CloudProvider, CloudResult, RegionScanner, Scope};
use hawk_proto::{
    AnalysisReport, AwsCredentials, CallerIdentity, CollectorFailure, CostSummary,
    SavingsBreakdown,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub primary_region: String,
    /// Billing APIs are global but served from one region.
    pub cost_region: String,
    pub fallback_regions: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            primary_region: "us-east-1".to_string(),
            cost_region: "us-east-1".to_string(),
            fallback_regions: hawk_cloud::FALLBACK_REGIONS
                .iter()
                .map(|r| r.to_string())
                .collect(),
        }
    }
}

pub struct Analyzer {
    provider: Arc<dyn CloudProvider>,
    config: AnalyzerConfig,
    scanner: RegionScanner,
}

fn settle<T>(
    collector: &str,
    result: CloudResult<T>,
    failures: &mut Vec<CollectorFailure>,
    errors: &mut Vec<CloudError>,
) -> T
where
    T: Default,
{
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(collector, error = %e, "collector failed, contributing nothing");
            failures.push(CollectorFailure {
                collector: collector.to_string(),
                message: e.to_string(),
            });
            errors.push(e);
            T::default()
        }
    }
}

impl Analyzer {
    pub fn new(provider: Arc<dyn CloudProvider>, config: AnalyzerConfig) -> Self {
        let scanner = RegionScanner::with_fallback(config.fallback_regions.clone());
        Self {
            provider,
            config,
            scanner,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn CloudProvider> {
        &self.provider
    }

    /// Identity check against the primary region. Never retried.
    pub async fn validate(&self, credentials: &AwsCredentials) -> AnalysisResult<CallerIdentity> {
        let scope = Scope::new(credentials.clone(), &self.config.primary_region);
        match self.provider.validate_credentials(&scope).await {
            Ok(identity) => {
                info!(account = %identity.account_id, arn = %identity.principal_arn, "credentials valid");
                Ok(identity)
            }
            Err(e) => {
                warn!(error = %e, "credential validation failed");
                Err(AnalysisError::from_validation(e))
            }
        }
    }

    pub async fn analyze(&self, credentials: &AwsCredentials) -> AnalysisResult<AnalysisReport> {
        self.analyze_at(credentials, Utc::now()).await
    }

    /// Run a full analysis with `now` as the end of every metric window.
    pub async fn analyze_at(
        &self,
        credentials: &AwsCredentials,
        now: DateTime<Utc>,
    ) -> AnalysisResult<AnalysisReport> {
        let identity = self.validate(credentials).await?;
        self.analyze_validated(credentials, &identity, now).await
    }

    /// Analysis for credentials already checked with [`validate`](Self::validate).
    pub async fn analyze_validated(
        &self,
        credentials: &AwsCredentials,
        identity: &CallerIdentity,
        now: DateTime<Utc>,
    ) -> AnalysisResult<AnalysisReport> {
        let provider = self.provider.as_ref();
        let primary = Scope::new(credentials.clone(), &self.config.primary_region);
        let billing = primary.in_region(&self.config.cost_region);

        let (ec2_r, ebs_r, snap_r, lambda_r, rds_r, cost_r, scan) = tokio::join!(
            ec2::collect(provider, &primary, now),
            ebs::collect(provider, &primary, now),
            snapshot::collect(provider, &primary, now),
            lambda::collect(provider, &primary, now),
            rds::collect(provider, &primary, now),
            cost::collect(provider, &billing, now.date_naive()),
            self.scanner.list_active_regions(provider, &primary),
        );

        let mut failures = Vec::new();
        let mut inventory_errors = Vec::new();
        let ec2_ok = ec2_r.is_ok();
        let mut ec2_section = settle("ec2", ec2_r, &mut failures, &mut inventory_errors);
        let mut ebs_section = settle("ebs", ebs_r, &mut failures, &mut inventory_errors);
        let mut snap_section = settle("snapshots", snap_r, &mut failures, &mut inventory_errors);
        let lambda_section = settle("lambda", lambda_r, &mut failures, &mut inventory_errors);
        let rds_section = settle("rds", rds_r, &mut failures, &mut inventory_errors);

        if inventory_errors.len() == 5 {
            return Err(AnalysisError::from_collector_errors(&inventory_errors));
        }

        let mut cost_errors = Vec::new();
        let cost_summary: CostSummary = settle("cost", cost_r, &mut failures, &mut cost_errors);

        let mut region = primary.region.clone();
        let mut regions_scanned = vec![primary.region.clone()];

        if ec2_ok && ec2_section.inventory.is_empty() {
            info!(region = %primary.region, "no instances in primary region, scanning others");
            for candidate in scan.regions.iter().filter(|r| **r != primary.region) {
                regions_scanned.push(candidate.clone());
                let scope = primary.in_region(candidate);
                match ec2::collect(provider, &scope, now).await {
                    Ok(found) if !found.inventory.is_empty() => {
                        info!(region = %candidate, instances = found.inventory.len(), "adopting region");
                        let (ebs_alt, snap_alt) = tokio::join!(
                            ebs::collect(provider, &scope, now),
                            snapshot::collect(provider, &scope, now),
                        );
                        let mut ignored = Vec::new();
                        ec2_section = found;
                        ebs_section = settle("ebs", ebs_alt, &mut failures, &mut ignored);
                        snap_section = settle("snapshots", snap_alt, &mut failures, &mut ignored);
                        region = candidate.clone();
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(region = %candidate, error = %e, "region scan failed, skipping"),
                }
            }
        }

        let savings = SavingsBreakdown {
            ec2: ec2_section.savings(),
            ebs: ebs_section.savings(),
            snapshots: snap_section.savings(),
            lambda: lambda_section.savings(),
            rds: rds_section.savings(),
        };
        let total_savings = savings.total();

        info!(
            region = %region,
            total_savings,
            failures = failures.len(),
            "analysis complete"
        );

        Ok(AnalysisReport {
            id: Uuid::new_v4(),
            generated_at: now,
            account_id: Some(identity.account_id.clone()),
            primary_region: primary.region.clone(),
            region,
            regions_scanned,
            cost: cost_summary,
            ec2: ec2_section,
            ebs: ebs_section,
            snapshots: snap_section,
            lambda: lambda_section,
            rds: rds_section,
            savings,
            total_savings,
            collector_failures: failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use hawk_cloud::metrics::namespace;
    use hawk_cloud::{FailureKind, FixtureCloud, FixtureOp, RegionInventory};
    use hawk_proto::{Datapoint, EbsVolume, Ec2Instance, Ec2State, ResourceKind, VolumeState};

    fn creds() -> AwsCredentials {
        AwsCredentials::new("AKIATEST", "secret")
    }

    fn instance(id: &str, state: Ec2State) -> Ec2Instance {
        Ec2Instance {
            instance_id: id.to_string(),
            name: None,
            instance_type: "t3.large".to_string(),
            state,
            launched_at: None,
            availability_zone: None,
            platform: None,
        }
    }

    fn volume(id: &str, size_gb: u32) -> EbsVolume {
        EbsVolume {
            volume_id: id.to_string(),
            volume_type: "gp3".to_string(),
            size_gb,
            state: VolumeState::Available,
            iops: None,
            attached_to: vec![],
            encrypted: false,
            created_at: None,
        }
    }

    fn idle_cpu(now: DateTime<Utc>) -> Vec<Datapoint> {
        (0..24)
            .map(|h| Datapoint {
                timestamp: now - Duration::hours(h),
                average: Some(2.0),
                maximum: Some(6.0),
                minimum: Some(0.5),
                sum: Some(2.0),
                sample_count: Some(60.0),
            })
            .collect()
    }

    fn analyzer(cloud: FixtureCloud) -> (Arc<FixtureCloud>, Analyzer) {
        let cloud = Arc::new(cloud);
        let analyzer = Analyzer::new(cloud.clone(), AnalyzerConfig::default());
        (cloud, analyzer)
    }

    #[tokio::test]
    async fn test_adopts_first_populated_region() {
        let now = Utc::now();
        let (cloud, analyzer) = analyzer(
            FixtureCloud::default()
                .with_region(
                    "us-east-1",
                    RegionInventory {
                        volumes: vec![volume("vol-primary", 10)],
                        ..Default::default()
                    },
                )
                .with_region("us-west-2", RegionInventory::default())
                .with_region(
                    "eu-west-1",
                    RegionInventory {
                        instances: vec![instance("i-eu", Ec2State::Running)],
                        volumes: vec![volume("vol-eu", 100)],
                        ..Default::default()
                    },
                )
                .with_region(
                    "ap-south-1",
                    RegionInventory {
                        instances: vec![instance("i-ap", Ec2State::Running)],
                        ..Default::default()
                    },
                )
                .with_metric(namespace::EC2, "CPUUtilization", "i-eu", idle_cpu(now)),
        );

        let report = analyzer.analyze_at(&creds(), now).await.unwrap();
        assert_eq!(report.primary_region, "us-east-1");
        assert_eq!(report.region, "eu-west-1");
        assert_eq!(report.ec2.inventory[0].instance_id, "i-eu");
        // EBS follows the adopted region.
        assert_eq!(report.ebs.inventory.len(), 1);
        assert_eq!(report.ebs.inventory[0].volume_id, "vol-eu");
        assert_eq!(report.savings.ebs, 10.0);
        assert_eq!(report.savings.ec2, 60.0);

        // Scanning stopped at eu-west-1; ap-south-1 was never queried.
        let scanned: Vec<String> = cloud
            .calls_of(FixtureOp::ListInstances)
            .into_iter()
            .map(|c| c.region)
            .collect();
        assert!(!scanned.contains(&"ap-south-1".to_string()));
        assert_eq!(report.regions_scanned, vec!["us-east-1", "us-west-2", "eu-west-1"]);
    }

    #[tokio::test]
    async fn test_invalid_credentials_fail_fast() {
        let (cloud, analyzer) = analyzer(
            FixtureCloud::default().fail(FixtureOp::ValidateCredentials, FailureKind::InvalidCredentials),
        );
        let err = analyzer.analyze_at(&creds(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidCredentials(_)));
        assert!(cloud.calls_of(FixtureOp::ListInstances).is_empty());
    }

    #[tokio::test]
    async fn test_single_collector_failure_degrades() {
        let now = Utc::now();
        let (_cloud, analyzer) = analyzer(
            FixtureCloud::default()
                .with_region(
                    "us-east-1",
                    RegionInventory {
                        instances: vec![instance("i-1", Ec2State::Stopped)],
                        volumes: vec![volume("vol-1", 100)],
                        ..Default::default()
                    },
                )
                .fail(FixtureOp::ListFunctions, FailureKind::AccessDenied),
        );
        let report = analyzer.analyze_at(&creds(), now).await.unwrap();
        assert_eq!(report.collector_failures.len(), 1);
        assert_eq!(report.collector_failures[0].collector, "lambda");
        assert_eq!(report.finding_count(ResourceKind::Ec2), 1);
        assert_eq!(report.total_savings, 25.0);
    }

    #[tokio::test]
    async fn test_every_inventory_denied_is_explicit_error() {
        let mut cloud = FixtureCloud::default();
        for op in [
            FixtureOp::ListInstances,
            FixtureOp::ListVolumes,
            FixtureOp::ListSnapshots,
            FixtureOp::ListFunctions,
            FixtureOp::ListDatabases,
        ] {
            cloud = cloud.fail(op, FailureKind::AccessDenied);
        }
        let (_cloud, analyzer) = analyzer(cloud);
        let err = analyzer.analyze_at(&creds(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_total_matches_breakdown() {
        let now = Utc::now();
        let (_cloud, analyzer) = analyzer(FixtureCloud::default().with_region(
            "us-east-1",
            RegionInventory {
                instances: vec![instance("i-1", Ec2State::Stopped)],
                volumes: vec![volume("vol-1", 33), volume("vol-2", 7)],
                ..Default::default()
            },
        ));
        let report = analyzer.analyze_at(&creds(), now).await.unwrap();
        let sum: f64 = ResourceKind::ALL.iter().map(|k| report.savings.get(*k)).sum();
        assert!((sum - report.total_savings).abs() < 0.005);
        assert!(report.findings().all(|f| f.estimated_monthly_savings >= 0.0));
        assert_eq!(report.account_id.as_deref(), Some("000000000000"));
    }
}
