//! EBS volume collector.

use crate::pricing::{EBS_PER_GB_MONTHLY, GP2_TO_GP3_PER_GB_MONTHLY, PIOPS_OVERPROVISIONED_MONTHLY};
use chrono::{DateTime, Utc};
use hawk_cloud::metrics::{dimension, namespace};
use hawk_cloud::{CloudProvider, CloudResult, MetricClient, Scope};
use hawk_proto::{
    EbsVolume, Finding, FindingRule, MetricStatistics, ResourceKind, ResourceSection,
    UsageMetrics, VolumeState, round2,
};
use tracing::{debug, info};

pub const WINDOW_DAYS: i64 = 7;
pub const LOW_IOPS_UTILIZATION_PCT: f64 = 20.0;
/// gp2 volumes below this monthly saving are not worth a migration.
pub const GP2_MIN_SAVINGS: f64 = 1.0;

fn finding(volume: &EbsVolume, rule: FindingRule, iops_pct: Option<f64>) -> Finding {
    Finding {
        kind: ResourceKind::Ebs,
        resource_id: volume.volume_id.clone(),
        resource_type: Some(volume.volume_type.clone()),
        name: None,
        rule,
        usage: UsageMetrics::Volume {
            size_gb: volume.size_gb,
            iops_utilization_pct: iops_pct,
        },
        reason: String::new(),
        estimated_monthly_savings: 0.0,
        recommendation: String::new(),
    }
}

pub fn classify_unattached(volume: &EbsVolume) -> Option<Finding> {
    if volume.state != VolumeState::Available {
        return None;
    }
    Some(Finding {
        reason: "Volume is not attached to any instance.".to_string(),
        estimated_monthly_savings: round2(f64::from(volume.size_gb) * EBS_PER_GB_MONTHLY),
        recommendation: "Snapshot the volume, then delete it".to_string(),
        ..finding(volume, FindingRule::Unattached, None)
    })
}

/// Share of provisioned IOPS actually used, in percent.
pub fn iops_utilization_pct(provisioned: u32, read: &MetricStatistics, write: &MetricStatistics) -> f64 {
    let used = (read.average + write.average) / 2.0;
    used / f64::from(provisioned) * 100.0
}

/// Flag an attached provisioned-IOPS volume using under a fifth of its IOPS.
pub fn classify_provisioned_iops(
    volume: &EbsVolume,
    read: &MetricStatistics,
    write: &MetricStatistics,
) -> Option<Finding> {
    if !volume.is_provisioned_iops() || volume.state != VolumeState::InUse {
        return None;
    }
    let provisioned = volume.iops.filter(|n| *n > 0)?;
    let pct = iops_utilization_pct(provisioned, read, write);
    if pct >= LOW_IOPS_UTILIZATION_PCT {
        return None;
    }
    Some(Finding {
        reason: format!(
            "Provisioned {provisioned} IOPS but used {:.0} on average ({pct:.1}% utilization).",
            (read.average + write.average) / 2.0
        ),
        estimated_monthly_savings: PIOPS_OVERPROVISIONED_MONTHLY,
        recommendation: "Convert to gp3 and provision only the IOPS in use".to_string(),
        ..finding(volume, FindingRule::LowIopsUtilization, Some(pct))
    })
}

pub fn classify_gp2(volume: &EbsVolume) -> Option<Finding> {
    if volume.volume_type != "gp2" || volume.state != VolumeState::InUse {
        return None;
    }
    let savings = round2(f64::from(volume.size_gb) * GP2_TO_GP3_PER_GB_MONTHLY);
    if savings <= GP2_MIN_SAVINGS {
        return None;
    }
    Some(Finding {
        reason: "Volume uses the older gp2 type; gp3 costs less for the same baseline.".to_string(),
        estimated_monthly_savings: savings,
        recommendation: "Migrate the volume to gp3".to_string(),
        ..finding(volume, FindingRule::Gp2Migration, None)
    })
}

pub async fn collect(
    provider: &dyn CloudProvider,
    scope: &Scope,
    now: DateTime<Utc>,
) -> CloudResult<ResourceSection<EbsVolume>> {
    let volumes = provider.list_volumes(scope).await?;
    let metrics = MetricClient::new(provider, scope).at(now);
    let mut findings = Vec::new();

    for volume in &volumes {
        findings.extend(classify_unattached(volume));

        if volume.is_provisioned_iops() && volume.state == VolumeState::InUse {
            let id = volume.volume_id.as_str();
            let (read, write) = tokio::join!(
                metrics.get_statistic(namespace::EBS, "VolumeReadOps", id, WINDOW_DAYS, dimension::VOLUME_ID),
                metrics.get_statistic(namespace::EBS, "VolumeWriteOps", id, WINDOW_DAYS, dimension::VOLUME_ID),
            );
            debug!(volume = id, read_avg = read.average, write_avg = write.average, "ebs iops window");
            findings.extend(classify_provisioned_iops(volume, &read, &write));
        }

        findings.extend(classify_gp2(volume));
    }

    info!(
        region = %scope.region,
        total = volumes.len(),
        flagged = findings.len(),
        "ebs collected"
    );
    Ok(ResourceSection {
        inventory: volumes,
        findings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_volume(volume_type: &str, size_gb: u32, state: VolumeState, iops: Option<u32>) -> EbsVolume {
        EbsVolume {
            volume_id: "vol-0abc".to_string(),
            volume_type: volume_type.to_string(),
            size_gb,
            state,
            iops,
            attached_to: vec![],
            encrypted: false,
            created_at: None,
        }
    }

    fn avg(average: f64) -> MetricStatistics {
        MetricStatistics {
            average,
            sample_count: 1,
            ..MetricStatistics::default()
        }
    }

    #[test]
    fn test_unattached_100gb_saves_ten() {
        let f = classify_unattached(&make_volume("gp3", 100, VolumeState::Available, None))
            .expect("flagged");
        assert_eq!(f.estimated_monthly_savings, 10.00);
        assert_eq!(f.rule, FindingRule::Unattached);
    }

    #[test]
    fn test_attached_not_unattached() {
        assert!(classify_unattached(&make_volume("gp3", 100, VolumeState::InUse, None)).is_none());
    }

    #[test]
    fn test_low_piops_flagged() {
        let vol = make_volume("io1", 200, VolumeState::InUse, Some(1000));
        // (100 + 100) / 2 = 100 of 1000 → 10%
        let f = classify_provisioned_iops(&vol, &avg(100.0), &avg(100.0)).expect("flagged");
        assert_eq!(f.estimated_monthly_savings, 25.0);
        assert!(matches!(
            f.usage,
            UsageMetrics::Volume { iops_utilization_pct: Some(p), .. } if (p - 10.0).abs() < 1e-9
        ));
    }

    #[test]
    fn test_busy_piops_not_flagged() {
        let vol = make_volume("io2", 200, VolumeState::InUse, Some(1000));
        assert!(classify_provisioned_iops(&vol, &avg(300.0), &avg(300.0)).is_none());
    }

    #[test]
    fn test_gp2_threshold() {
        let small = make_volume("gp2", 50, VolumeState::InUse, None);
        assert!(classify_gp2(&small).is_none(), "50 GB saves exactly 1.00, not above");
        let large = make_volume("gp2", 500, VolumeState::InUse, None);
        assert_eq!(classify_gp2(&large).expect("flagged").estimated_monthly_savings, 10.0);
    }

    #[test]
    fn test_unattached_gp2_only_unattached_rule() {
        let vol = make_volume("gp2", 500, VolumeState::Available, None);
        assert!(classify_gp2(&vol).is_none());
        assert!(classify_unattached(&vol).is_some());
    }
}
