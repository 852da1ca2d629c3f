//! RDS instance collector.

use crate::pricing::rds_monthly_cost;
use crate::sizing::suggest_db_class;
use chrono::{DateTime, Utc};
use hawk_cloud::metrics::{dimension, namespace};
use hawk_cloud::{CloudProvider, CloudResult, MetricClient, Scope};
use hawk_proto::{
    Finding, FindingRule, MetricStatistics, RdsInstance, ResourceKind, ResourceSection,
    UsageMetrics, round2,
};
use tracing::{debug, info};

pub const WINDOW_DAYS: i64 = 7;
pub const LOW_CPU_AVERAGE_PCT: f64 = 20.0;
pub const LOW_CONNECTIONS_AVERAGE: f64 = 5.0;
pub const LOW_CONNECTIONS_MAXIMUM: f64 = 2.0;

/// Window statistics gathered for one DB instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct DbUsage {
    pub cpu: MetricStatistics,
    pub connections: MetricStatistics,
    pub read_iops: MetricStatistics,
    pub write_iops: MetricStatistics,
}

/// At most one finding per instance; the CPU + connections rule wins over
/// the low-peak-connections rule.
pub fn classify(db: &RdsInstance, usage: &DbUsage) -> Option<Finding> {
    let (rule, reason, recommendation) = if usage.cpu.average < LOW_CPU_AVERAGE_PCT
        && usage.connections.average < LOW_CONNECTIONS_AVERAGE
    {
        let suggested = suggest_db_class(&db.instance_class, usage.cpu.average);
        let recommendation = if suggested != db.instance_class {
            format!("Downsize to {suggested}")
        } else {
            "Review the workload; the class cannot be sized down further".to_string()
        };
        (
            FindingRule::LowCpu,
            format!(
                "Low CPU ({:.1}% average) and few connections ({:.0} average) over the last \
                 {WINDOW_DAYS} days. Database is over-provisioned.",
                usage.cpu.average, usage.connections.average
            ),
            recommendation,
        )
    } else if usage.connections.maximum < LOW_CONNECTIONS_MAXIMUM {
        (
            FindingRule::LowConnections,
            format!(
                "At most {:.0} connections in {WINDOW_DAYS} days. Database looks unused or dev-only.",
                usage.connections.maximum
            ),
            "Stop it, or move dev/test workloads to a smaller class".to_string(),
        )
    } else {
        return None;
    };

    Some(Finding {
        kind: ResourceKind::Rds,
        resource_id: db.db_instance_id.clone(),
        resource_type: Some(db.instance_class.clone()),
        name: Some(format!(
            "{} {}",
            db.engine,
            db.engine_version.as_deref().unwrap_or_default()
        )
        .trim_end()
        .to_string()),
        rule,
        usage: UsageMetrics::Database {
            cpu_average: usage.cpu.average,
            cpu_maximum: usage.cpu.maximum,
            connections_average: usage.connections.average,
            connections_maximum: usage.connections.maximum,
            read_iops: usage.read_iops.average,
            write_iops: usage.write_iops.average,
        },
        reason,
        estimated_monthly_savings: round2(rds_monthly_cost(&db.instance_class, db.multi_az)),
        recommendation,
    })
}

pub async fn collect(
    provider: &dyn CloudProvider,
    scope: &Scope,
    now: DateTime<Utc>,
) -> CloudResult<ResourceSection<RdsInstance>> {
    let databases = provider.list_databases(scope).await?;
    let metrics = MetricClient::new(provider, scope).at(now);
    let mut findings = Vec::new();

    for db in &databases {
        let id = db.db_instance_id.as_str();
        let (ns, dim) = (namespace::RDS, dimension::DB_INSTANCE_ID);
        let (cpu, connections, read_iops, write_iops) = tokio::join!(
            metrics.get_statistic(ns, "CPUUtilization", id, WINDOW_DAYS, dim),
            metrics.get_statistic(ns, "DatabaseConnections", id, WINDOW_DAYS, dim),
            metrics.get_statistic(ns, "ReadIOPS", id, WINDOW_DAYS, dim),
            metrics.get_statistic(ns, "WriteIOPS", id, WINDOW_DAYS, dim),
        );
        let usage = DbUsage {
            cpu,
            connections,
            read_iops,
            write_iops,
        };
        debug!(
            db = id,
            cpu_avg = usage.cpu.average,
            connections_avg = usage.connections.average,
            "rds window"
        );
        findings.extend(classify(db, &usage));
    }

    info!(
        region = %scope.region,
        total = databases.len(),
        flagged = findings.len(),
        "rds collected"
    );
    Ok(ResourceSection {
        inventory: databases,
        findings,
    })
}
