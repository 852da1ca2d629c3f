//! Lambda function collector.

use crate::pricing::{LAMBDA_HIGH_ERROR_MONTHLY, LAMBDA_UNUSED_MONTHLY};
use chrono::{DateTime, Utc};
use hawk_cloud::metrics::{dimension, namespace};
use hawk_cloud::{CloudProvider, CloudResult, MetricClient, Scope};
use hawk_proto::{
    Finding, FindingRule, LambdaFunction, MetricStatistics, ResourceKind, ResourceSection,
    UsageMetrics,
};
use tracing::{debug, info};

pub const WINDOW_DAYS: i64 = 30;
pub const MIN_INVOCATIONS: f64 = 10.0;
pub const MAX_ERROR_RATE: f64 = 0.10;

/// At most one finding per function; the low-invocation rule wins.
pub fn classify(
    function: &LambdaFunction,
    invocations: &MetricStatistics,
    errors: &MetricStatistics,
    duration: &MetricStatistics,
) -> Option<Finding> {
    let calls = invocations.sum;
    let failed = errors.sum;
    let usage = UsageMetrics::Function {
        invocations: calls.max(0.0).floor() as u64,
        errors: failed.max(0.0).floor() as u64,
        average_duration_ms: duration.average,
    };
    let base = |rule, reason: String, savings, recommendation: &str| Finding {
        kind: ResourceKind::Lambda,
        resource_id: function.function_name.clone(),
        resource_type: function.runtime.clone(),
        name: Some(function.function_name.clone()),
        rule,
        usage: usage.clone(),
        reason,
        estimated_monthly_savings: savings,
        recommendation: recommendation.to_string(),
    };

    if calls < MIN_INVOCATIONS {
        return Some(base(
            FindingRule::LowInvocations,
            format!(
                "Only {} invocations in the last {WINDOW_DAYS} days; function is possibly unused.",
                calls.floor()
            ),
            LAMBDA_UNUSED_MONTHLY,
            "Review the function and remove it if no longer needed",
        ));
    }

    if calls > 0.0 && failed / calls > MAX_ERROR_RATE {
        return Some(base(
            FindingRule::HighErrorRate,
            format!(
                "High error rate: {:.1}% ({} errors out of {} invocations).",
                failed / calls * 100.0,
                failed.floor(),
                calls.floor()
            ),
            LAMBDA_HIGH_ERROR_MONTHLY,
            "Fix the failing invocations to stop paying for wasted compute",
        ));
    }

    None
}

pub async fn collect(
    provider: &dyn CloudProvider,
    scope: &Scope,
    now: DateTime<Utc>,
) -> CloudResult<ResourceSection<LambdaFunction>> {
    let functions = provider.list_functions(scope).await?;
    let metrics = MetricClient::new(provider, scope).at(now);
    let mut findings = Vec::new();

    for function in &functions {
        let name = function.function_name.as_str();
        let (invocations, errors, duration) = tokio::join!(
            metrics.get_statistic(namespace::LAMBDA, "Invocations", name, WINDOW_DAYS, dimension::FUNCTION_NAME),
            metrics.get_statistic(namespace::LAMBDA, "Errors", name, WINDOW_DAYS, dimension::FUNCTION_NAME),
            metrics.get_statistic(namespace::LAMBDA, "Duration", name, WINDOW_DAYS, dimension::FUNCTION_NAME),
        );
        debug!(function = name, invocations = invocations.sum, errors = errors.sum, "lambda window");
        findings.extend(classify(function, &invocations, &errors, &duration));
    }

    info!(
        region = %scope.region,
        total = functions.len(),
        flagged = findings.len(),
        "lambda collected"
    );
    Ok(ResourceSection {
        inventory: functions,
        findings,
    })
}
