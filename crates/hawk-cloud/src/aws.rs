//! Live AWS backend over the official SDK.
//!
//! Every call builds service clients from a per-(access key, region)
//! [`SdkConfig`](aws_config::SdkConfig) cached for the life of the provider.

use crate::{CloudError, CloudProvider, CloudResult, CostPeriod, DateRange, MetricQuery, Scope, StopResult};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_ec2::error::{ProvideErrorMetadata, SdkError};
use aws_smithy_types::DateTime as SmithyDateTime;
use aws_smithy_types::error::display::DisplayErrorContext;
use chrono::{DateTime, Utc};
use hawk_proto::{
    CallerIdentity, Datapoint, EbsVolume, Ec2Instance, Ec2State, LambdaFunction, RdsInstance,
    Snapshot, VolumeState,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

const CREDENTIALS_PROVIDER_NAME: &str = "costhawk";

#[derive(Debug, Default)]
pub struct AwsCloud {
    configs: Mutex<HashMap<(String, String), SdkConfig>>,
}

impl AwsCloud {
    pub fn new() -> Self {
        Self::default()
    }

    async fn config(&self, scope: &Scope) -> SdkConfig {
        let key = (scope.credentials.access_key_id.clone(), scope.region.clone());
        if let Some(config) = self.configs.lock().get(&key) {
            return config.clone();
        }

        let credentials = aws_sdk_sts::config::Credentials::new(
            scope.credentials.access_key_id.clone(),
            scope.credentials.secret_access_key.clone(),
            scope.credentials.session_token.clone(),
            None,
            CREDENTIALS_PROVIDER_NAME,
        );
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(scope.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;
        debug!(region = %scope.region, "aws sdk config loaded");
        self.configs.lock().insert(key, config.clone());
        config
    }
}

fn sdk_error<E, R>(err: SdkError<E, R>) -> CloudError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_owned);
    let message = err
        .message()
        .map(str::to_owned)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
    CloudError::from_code(code.as_deref(), message)
}

fn to_chrono(dt: Option<&SmithyDateTime>) -> Option<DateTime<Utc>> {
    dt.and_then(|d| DateTime::from_timestamp(d.secs(), d.subsec_nanos()))
}

fn to_smithy(dt: DateTime<Utc>) -> SmithyDateTime {
    SmithyDateTime::from_secs(dt.timestamp())
}

fn non_negative(v: Option<i32>) -> u32 {
    v.map(|n| n.max(0) as u32).unwrap_or(0)
}

fn next_token(token: Option<&str>) -> Option<String> {
    token.filter(|t| !t.is_empty()).map(str::to_owned)
}

fn parse_amount(amount: Option<&str>) -> f64 {
    amount.and_then(|a| a.parse::<f64>().ok()).unwrap_or(0.0)
}

#[async_trait]
impl CloudProvider for AwsCloud {
    fn name(&self) -> &str {
        "aws"
    }

    async fn validate_credentials(&self, scope: &Scope) -> CloudResult<CallerIdentity> {
        let client = aws_sdk_sts::Client::new(&self.config(scope).await);
        let out = client.get_caller_identity().send().await.map_err(sdk_error)?;
        Ok(CallerIdentity {
            account_id: out.account().unwrap_or_default().to_string(),
            principal_arn: out.arn().unwrap_or_default().to_string(),
            user_id: out.user_id().unwrap_or_default().to_string(),
        })
    }

    async fn list_regions(&self, scope: &Scope) -> CloudResult<Vec<String>> {
        let client = aws_sdk_ec2::Client::new(&self.config(scope).await);
        let out = client.describe_regions().send().await.map_err(sdk_error)?;
        Ok(out
            .regions()
            .iter()
            .filter_map(|r| r.region_name().map(str::to_owned))
            .collect())
    }

    async fn list_instances(&self, scope: &Scope) -> CloudResult<Vec<Ec2Instance>> {
        let client = aws_sdk_ec2::Client::new(&self.config(scope).await);
        let mut instances = Vec::new();
        let mut token = None;
        loop {
            let out = client
                .describe_instances()
                .set_next_token(token.take())
                .send()
                .await
                .map_err(sdk_error)?;
            for reservation in out.reservations() {
                for i in reservation.instances() {
                    let Some(id) = i.instance_id() else { continue };
                    let name = i
                        .tags()
                        .iter()
                        .find(|t| t.key() == Some("Name"))
                        .and_then(|t| t.value())
                        .map(str::to_owned);
                    instances.push(Ec2Instance {
                        instance_id: id.to_string(),
                        name,
                        instance_type: i
                            .instance_type()
                            .map(|t| t.as_str().to_string())
                            .unwrap_or_default(),
                        state: i
                            .state()
                            .and_then(|s| s.name())
                            .map(|n| Ec2State::from_api(n.as_str()))
                            .unwrap_or_default(),
                        launched_at: to_chrono(i.launch_time()),
                        availability_zone: i
                            .placement()
                            .and_then(|p| p.availability_zone())
                            .map(str::to_owned),
                        platform: i.platform_details().map(str::to_owned),
                    });
                }
            }
            token = next_token(out.next_token());
            if token.is_none() {
                break;
            }
        }
        Ok(instances)
    }

    async fn list_volumes(&self, scope: &Scope) -> CloudResult<Vec<EbsVolume>> {
        let client = aws_sdk_ec2::Client::new(&self.config(scope).await);
        let mut volumes = Vec::new();
        let mut token = None;
        loop {
            let out = client
                .describe_volumes()
                .set_next_token(token.take())
                .send()
                .await
                .map_err(sdk_error)?;
            for v in out.volumes() {
                let Some(id) = v.volume_id() else { continue };
                volumes.push(EbsVolume {
                    volume_id: id.to_string(),
                    volume_type: v
                        .volume_type()
                        .map(|t| t.as_str().to_string())
                        .unwrap_or_default(),
                    size_gb: non_negative(v.size()),
                    state: v
                        .state()
                        .map(|s| VolumeState::from_api(s.as_str()))
                        .unwrap_or_default(),
                    iops: v.iops().map(|n| n.max(0) as u32),
                    attached_to: v
                        .attachments()
                        .iter()
                        .filter_map(|a| a.instance_id().map(str::to_owned))
                        .collect(),
                    encrypted: v.encrypted().unwrap_or(false),
                    created_at: to_chrono(v.create_time()),
                });
            }
            token = next_token(out.next_token());
            if token.is_none() {
                break;
            }
        }
        Ok(volumes)
    }

    async fn list_snapshots(&self, scope: &Scope) -> CloudResult<Vec<Snapshot>> {
        let client = aws_sdk_ec2::Client::new(&self.config(scope).await);
        let mut snapshots = Vec::new();
        let mut token = None;
        loop {
            let out = client
                .describe_snapshots()
                .owner_ids("self")
                .set_next_token(token.take())
                .send()
                .await
                .map_err(sdk_error)?;
            for s in out.snapshots() {
                let Some(id) = s.snapshot_id() else { continue };
                snapshots.push(Snapshot {
                    snapshot_id: id.to_string(),
                    volume_id: s.volume_id().map(str::to_owned),
                    size_gb: non_negative(s.volume_size()),
                    started_at: to_chrono(s.start_time()),
                    description: s.description().filter(|d| !d.is_empty()).map(str::to_owned),
                });
            }
            token = next_token(out.next_token());
            if token.is_none() {
                break;
            }
        }
        Ok(snapshots)
    }

    async fn list_functions(&self, scope: &Scope) -> CloudResult<Vec<LambdaFunction>> {
        let client = aws_sdk_lambda::Client::new(&self.config(scope).await);
        let mut functions = Vec::new();
        let mut marker = None;
        loop {
            let out = client
                .list_functions()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(sdk_error)?;
            for f in out.functions() {
                let Some(name) = f.function_name() else { continue };
                functions.push(LambdaFunction {
                    function_name: name.to_string(),
                    runtime: f.runtime().map(|r| r.as_str().to_string()),
                    memory_mb: non_negative(f.memory_size()),
                    timeout_secs: non_negative(f.timeout()),
                    code_size_bytes: f.code_size().max(0) as u64,
                    last_modified: f.last_modified().map(str::to_owned),
                });
            }
            marker = next_token(out.next_marker());
            if marker.is_none() {
                break;
            }
        }
        Ok(functions)
    }

    async fn list_databases(&self, scope: &Scope) -> CloudResult<Vec<RdsInstance>> {
        let client = aws_sdk_rds::Client::new(&self.config(scope).await);
        let mut databases = Vec::new();
        let mut marker = None;
        loop {
            let out = client
                .describe_db_instances()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(sdk_error)?;
            for db in out.db_instances() {
                let Some(id) = db.db_instance_identifier() else { continue };
                databases.push(RdsInstance {
                    db_instance_id: id.to_string(),
                    instance_class: db.db_instance_class().unwrap_or_default().to_string(),
                    engine: db.engine().unwrap_or_default().to_string(),
                    engine_version: db.engine_version().map(str::to_owned),
                    status: db.db_instance_status().unwrap_or_default().to_string(),
                    multi_az: db.multi_az().unwrap_or(false),
                    allocated_storage_gb: non_negative(db.allocated_storage()),
                    created_at: to_chrono(db.instance_create_time()),
                });
            }
            marker = next_token(out.marker());
            if marker.is_none() {
                break;
            }
        }
        Ok(databases)
    }

    async fn metric_datapoints(
        &self,
        scope: &Scope,
        query: &MetricQuery,
    ) -> CloudResult<Vec<Datapoint>> {
        use aws_sdk_cloudwatch::types::{Dimension, Statistic};

        let client = aws_sdk_cloudwatch::Client::new(&self.config(scope).await);
        let out = client
            .get_metric_statistics()
            .namespace(&query.namespace)
            .metric_name(&query.metric_name)
            .dimensions(
                Dimension::builder()
                    .name(&query.dimension_name)
                    .value(&query.resource_id)
                    .build(),
            )
            .start_time(to_smithy(query.start))
            .end_time(to_smithy(query.end))
            .period(query.period_secs)
            .statistics(Statistic::Average)
            .statistics(Statistic::Maximum)
            .statistics(Statistic::Minimum)
            .statistics(Statistic::Sum)
            .statistics(Statistic::SampleCount)
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(out
            .datapoints()
            .iter()
            .filter_map(|p| {
                Some(Datapoint {
                    timestamp: to_chrono(p.timestamp())?,
                    average: p.average(),
                    maximum: p.maximum(),
                    minimum: p.minimum(),
                    sum: p.sum(),
                    sample_count: p.sample_count(),
                })
            })
            .collect())
    }

    async fn stop_instance(&self, scope: &Scope, instance_id: &str) -> CloudResult<StopResult> {
        let client = aws_sdk_ec2::Client::new(&self.config(scope).await);
        let out = client
            .stop_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(sdk_error)?;
        let change = out
            .stopping_instances()
            .first()
            .ok_or_else(|| CloudError::NotFound(format!("instance {instance_id}")))?;
        let state = |s: Option<&aws_sdk_ec2::types::InstanceState>| {
            s.and_then(|s| s.name())
                .map(|n| Ec2State::from_api(n.as_str()))
                .unwrap_or_default()
        };
        Ok(StopResult {
            instance_id: instance_id.to_string(),
            previous_state: state(change.previous_state()),
            current_state: state(change.current_state()),
        })
    }

    async fn cost_and_usage(&self, scope: &Scope, period: DateRange) -> CloudResult<CostPeriod> {
        use aws_sdk_costexplorer::types::{
            DateInterval, Granularity, GroupDefinition, GroupDefinitionType,
        };

        let client = aws_sdk_costexplorer::Client::new(&self.config(scope).await);
        let interval = DateInterval::builder()
            .start(period.start.to_string())
            .end(period.end.to_string())
            .build()
            .map_err(|e| CloudError::Upstream(e.to_string()))?;
        let out = client
            .get_cost_and_usage()
            .time_period(interval)
            .granularity(Granularity::Monthly)
            .metrics("UnblendedCost")
            .group_by(
                GroupDefinition::builder()
                    .r#type(GroupDefinitionType::Dimension)
                    .key("SERVICE")
                    .build(),
            )
            .send()
            .await
            .map_err(sdk_error)?;

        // Grouped queries leave `Total` empty; the amount is the sum of groups.
        let mut cost = CostPeriod::default();
        for result in out.results_by_time() {
            for group in result.groups() {
                let Some(service) = group.keys().first() else { continue };
                let amount = group
                    .metrics()
                    .and_then(|m| m.get("UnblendedCost"))
                    .map(|v| parse_amount(v.amount()))
                    .unwrap_or(0.0);
                *cost.groups.entry(service.clone()).or_insert(0.0) += amount;
            }
            if let Some(total) = result
                .total()
                .and_then(|t| t.get("UnblendedCost"))
                .map(|v| parse_amount(v.amount()))
                .filter(|t| *t > 0.0)
            {
                *cost.total.get_or_insert(0.0) += total;
            }
        }
        Ok(cost)
    }

    async fn cost_forecast(&self, scope: &Scope, period: DateRange) -> CloudResult<f64> {
        use aws_sdk_costexplorer::types::{DateInterval, Granularity, Metric};

        let client = aws_sdk_costexplorer::Client::new(&self.config(scope).await);
        let interval = DateInterval::builder()
            .start(period.start.to_string())
            .end(period.end.to_string())
            .build()
            .map_err(|e| CloudError::Upstream(e.to_string()))?;
        let out = client
            .get_cost_forecast()
            .time_period(interval)
            .metric(Metric::UnblendedCost)
            .granularity(Granularity::Monthly)
            .send()
            .await
            .map_err(sdk_error)?;
        out.total()
            .and_then(|t| t.amount())
            .and_then(|a| a.parse::<f64>().ok())
            .ok_or_else(|| CloudError::Upstream("forecast response carried no total".to_string()))
    }
}
