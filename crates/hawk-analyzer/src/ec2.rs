//! EC2 instance collector.

use crate::pricing::{EC2_STOPPED_MONTHLY, ec2_monthly_cost};
use crate::sizing::suggest_instance_type;
use chrono::{DateTime, Utc};
use hawk_cloud::metrics::{dimension, namespace};
use hawk_cloud::{CloudProvider, CloudResult, MetricClient, Scope};
use hawk_proto::{
    Ec2Instance, Ec2State, Finding, FindingRule, MetricStatistics, ResourceKind, ResourceSection,
    UsageMetrics, round2,
};
use tracing::{debug, info};

pub const WINDOW_DAYS: i64 = 7;
pub const LOW_CPU_AVERAGE_PCT: f64 = 10.0;
pub const LOW_CPU_MAXIMUM_PCT: f64 = 30.0;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Flag a running instance whose CPU stayed low on average and at peak.
///
/// A window with no samples is never flagged.
pub fn classify_running(
    instance: &Ec2Instance,
    cpu: &MetricStatistics,
    network_in: &MetricStatistics,
) -> Option<Finding> {
    if !cpu.has_data() || cpu.average >= LOW_CPU_AVERAGE_PCT || cpu.maximum >= LOW_CPU_MAXIMUM_PCT {
        return None;
    }

    let suggested = suggest_instance_type(&instance.instance_type, cpu.average);
    let recommendation = if suggested != instance.instance_type {
        format!("Downsize to {suggested}")
    } else {
        format!(
            "{} is already the smallest size in its family; consolidate workloads or stop it when idle",
            instance.instance_type
        )
    };

    Some(Finding {
        kind: ResourceKind::Ec2,
        resource_id: instance.instance_id.clone(),
        resource_type: Some(instance.instance_type.clone()),
        name: Some(instance.display_name().to_string()),
        rule: FindingRule::LowCpu,
        usage: UsageMetrics::Compute {
            cpu_average: cpu.average,
            cpu_maximum: cpu.maximum,
            network_in_bytes: network_in.average,
        },
        reason: format!(
            "CPU utilization was {:.1}% average and {:.1}% peak over the last {WINDOW_DAYS} days \
             ({:.2} MB average network in). Instance is underutilized.",
            cpu.average,
            cpu.maximum,
            network_in.average / BYTES_PER_MB
        ),
        estimated_monthly_savings: round2(ec2_monthly_cost(&instance.instance_type)),
        recommendation,
    })
}

/// Stopped instances are always candidates: attached storage keeps billing.
pub fn classify_stopped(instance: &Ec2Instance) -> Finding {
    Finding {
        kind: ResourceKind::Ec2,
        resource_id: instance.instance_id.clone(),
        resource_type: Some(instance.instance_type.clone()),
        name: Some(instance.display_name().to_string()),
        rule: FindingRule::Stopped,
        usage: UsageMetrics::Stopped,
        reason: "Instance is stopped but still billed for attached storage.".to_string(),
        estimated_monthly_savings: EC2_STOPPED_MONTHLY,
        recommendation: "Terminate if no longer needed, or start it again if still required"
            .to_string(),
    }
}

pub async fn collect(
    provider: &dyn CloudProvider,
    scope: &Scope,
    now: DateTime<Utc>,
) -> CloudResult<ResourceSection<Ec2Instance>> {
    let instances = provider.list_instances(scope).await?;
    let metrics = MetricClient::new(provider, scope).at(now);
    let mut findings = Vec::new();

    for instance in &instances {
        match instance.state {
            Ec2State::Running => {
                let id = instance.instance_id.as_str();
                let (cpu, network) = tokio::join!(
                    metrics.get_statistic(
                        namespace::EC2,
                        "CPUUtilization",
                        id,
                        WINDOW_DAYS,
                        dimension::INSTANCE_ID
                    ),
                    metrics.get_statistic(
                        namespace::EC2,
                        "NetworkIn",
                        id,
                        WINDOW_DAYS,
                        dimension::INSTANCE_ID
                    ),
                );
                debug!(
                    instance = id,
                    cpu_avg = cpu.average,
                    cpu_max = cpu.maximum,
                    samples = cpu.sample_count,
                    "ec2 cpu window"
                );
                if let Some(finding) = classify_running(instance, &cpu, &network) {
                    findings.push(finding);
                }
            }
            Ec2State::Stopped => findings.push(classify_stopped(instance)),
            _ => {}
        }
    }

    info!(
        region = %scope.region,
        total = instances.len(),
        flagged = findings.len(),
        "ec2 collected"
    );
    Ok(ResourceSection {
        inventory: instances,
        findings,
    })
}
