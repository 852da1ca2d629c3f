//! In-memory cloud account for tests and offline runs.
//!
//! A [`FixtureCloud`] is built either with the builder methods or from a JSON
//! document matching [`FixtureData`]. Metric series are matched on
//! (namespace, metric, resource) and returned whole; the query window is
//! not applied.

use crate::{
    CloudError, CloudProvider, CloudResult, CostPeriod, DateRange, MetricQuery, Scope, StopResult,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use hawk_proto::{
    CallerIdentity, Datapoint, EbsVolume, Ec2Instance, Ec2State, LambdaFunction, RdsInstance,
    Snapshot,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

// ─── Fixture Data ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureOp {
    ValidateCredentials,
    ListRegions,
    ListInstances,
    ListVolumes,
    ListSnapshots,
    ListFunctions,
    ListDatabases,
    MetricDatapoints,
    StopInstance,
    CostAndUsage,
    CostForecast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidCredentials,
    ExpiredCredentials,
    AccessDenied,
    Throttled,
    Upstream,
}

impl FailureKind {
    fn to_error(self, op: FixtureOp) -> CloudError {
        let msg = format!("injected failure for {op:?}");
        match self {
            Self::InvalidCredentials => CloudError::InvalidCredentials(msg),
            Self::ExpiredCredentials => CloudError::ExpiredCredentials(msg),
            Self::AccessDenied => CloudError::AccessDenied(msg),
            Self::Throttled => CloudError::Throttled(msg),
            Self::Upstream => CloudError::Upstream(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegionInventory {
    #[serde(default)]
    pub instances: Vec<Ec2Instance>,
    #[serde(default)]
    pub volumes: Vec<EbsVolume>,
    #[serde(default)]
    pub snapshots: Vec<Snapshot>,
    #[serde(default)]
    pub functions: Vec<LambdaFunction>,
    #[serde(default)]
    pub databases: Vec<RdsInstance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub namespace: String,
    pub metric_name: String,
    pub resource_id: String,
    pub datapoints: Vec<Datapoint>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FixtureData {
    #[serde(default)]
    pub identity: Option<CallerIdentity>,
    /// Explicit region list; region keys of `inventories` are appended.
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub inventories: BTreeMap<String, RegionInventory>,
    #[serde(default)]
    pub metrics: Vec<MetricSeries>,
    /// Keyed by the first day of the billing window.
    #[serde(default)]
    pub costs: BTreeMap<NaiveDate, CostPeriod>,
    #[serde(default)]
    pub forecast: Option<f64>,
    #[serde(default)]
    pub failures: BTreeMap<FixtureOp, FailureKind>,
}

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureCall {
    pub op: FixtureOp,
    pub region: String,
}

// ─── Fixture Cloud ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FixtureCloud {
    data: Mutex<FixtureData>,
    calls: Mutex<Vec<FixtureCall>>,
}

impl FixtureCloud {
    pub fn from_data(data: FixtureData) -> Self {
        Self {
            data: Mutex::new(data),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CloudError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CloudError::Upstream(format!("reading {}: {e}", path.display())))?;
        let data: FixtureData = serde_json::from_str(&content)
            .map_err(|e| CloudError::Upstream(format!("parsing {}: {e}", path.display())))?;
        info!(path = %path.display(), regions = data.inventories.len(), "fixture account loaded");
        Ok(Self::from_data(data))
    }

    pub fn with_identity(self, identity: CallerIdentity) -> Self {
        self.data.lock().identity = Some(identity);
        self
    }

    pub fn with_region(self, region: &str, inventory: RegionInventory) -> Self {
        {
            let mut data = self.data.lock();
            if !data.regions.iter().any(|r| r == region) {
                data.regions.push(region.to_string());
            }
            data.inventories.insert(region.to_string(), inventory);
        }
        self
    }

    pub fn with_metric(
        self,
        namespace: &str,
        metric_name: &str,
        resource_id: &str,
        datapoints: Vec<Datapoint>,
    ) -> Self {
        self.data.lock().metrics.push(MetricSeries {
            namespace: namespace.to_string(),
            metric_name: metric_name.to_string(),
            resource_id: resource_id.to_string(),
            datapoints,
        });
        self
    }

    pub fn with_cost(self, start: NaiveDate, period: CostPeriod) -> Self {
        self.data.lock().costs.insert(start, period);
        self
    }

    pub fn with_forecast(self, amount: f64) -> Self {
        self.data.lock().forecast = Some(amount);
        self
    }

    pub fn fail(self, op: FixtureOp, kind: FailureKind) -> Self {
        self.data.lock().failures.insert(op, kind);
        self
    }

    /// Clear an injected failure.
    pub fn heal(&self, op: FixtureOp) {
        self.data.lock().failures.remove(&op);
    }

    pub fn calls(&self) -> Vec<FixtureCall> {
        self.calls.lock().clone()
    }

    pub fn calls_of(&self, op: FixtureOp) -> Vec<FixtureCall> {
        self.calls.lock().iter().filter(|c| c.op == op).cloned().collect()
    }

    pub fn instance_state(&self, instance_id: &str) -> Option<Ec2State> {
        self.data
            .lock()
            .inventories
            .values()
            .flat_map(|inv| inv.instances.iter())
            .find(|i| i.instance_id == instance_id)
            .map(|i| i.state)
    }

    fn enter(&self, op: FixtureOp, scope: &Scope) -> CloudResult<()> {
        self.calls.lock().push(FixtureCall {
            op,
            region: scope.region.clone(),
        });
        match self.data.lock().failures.get(&op) {
            Some(kind) => Err(kind.to_error(op)),
            None => Ok(()),
        }
    }

    fn inventory<T: Clone>(
        &self,
        scope: &Scope,
        pick: impl Fn(&RegionInventory) -> &Vec<T>,
    ) -> Vec<T> {
        self.data
            .lock()
            .inventories
            .get(&scope.region)
            .map(|inv| pick(inv).clone())
            .unwrap_or_default()
    }
}

fn default_identity() -> CallerIdentity {
    CallerIdentity {
        account_id: "000000000000".to_string(),
        principal_arn: "arn:aws:iam::000000000000:user/fixture".to_string(),
        user_id: "AIDAFIXTURE".to_string(),
    }
}

#[async_trait]
impl CloudProvider for FixtureCloud {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn validate_credentials(&self, scope: &Scope) -> CloudResult<CallerIdentity> {
        self.enter(FixtureOp::ValidateCredentials, scope)?;
        Ok(self.data.lock().identity.clone().unwrap_or_else(default_identity))
    }

    async fn list_regions(&self, scope: &Scope) -> CloudResult<Vec<String>> {
        self.enter(FixtureOp::ListRegions, scope)?;
        let data = self.data.lock();
        let mut regions = data.regions.clone();
        for region in data.inventories.keys() {
            if !regions.contains(region) {
                regions.push(region.clone());
            }
        }
        Ok(regions)
    }

    async fn list_instances(&self, scope: &Scope) -> CloudResult<Vec<Ec2Instance>> {
        self.enter(FixtureOp::ListInstances, scope)?;
        Ok(self.inventory(scope, |inv| &inv.instances))
    }

    async fn list_volumes(&self, scope: &Scope) -> CloudResult<Vec<EbsVolume>> {
        self.enter(FixtureOp::ListVolumes, scope)?;
        Ok(self.inventory(scope, |inv| &inv.volumes))
    }

    async fn list_snapshots(&self, scope: &Scope) -> CloudResult<Vec<Snapshot>> {
        self.enter(FixtureOp::ListSnapshots, scope)?;
        Ok(self.inventory(scope, |inv| &inv.snapshots))
    }

    async fn list_functions(&self, scope: &Scope) -> CloudResult<Vec<LambdaFunction>> {
        self.enter(FixtureOp::ListFunctions, scope)?;
        Ok(self.inventory(scope, |inv| &inv.functions))
    }

    async fn list_databases(&self, scope: &Scope) -> CloudResult<Vec<RdsInstance>> {
        self.enter(FixtureOp::ListDatabases, scope)?;
        Ok(self.inventory(scope, |inv| &inv.databases))
    }

    async fn metric_datapoints(
        &self,
        scope: &Scope,
        query: &MetricQuery,
    ) -> CloudResult<Vec<Datapoint>> {
        self.enter(FixtureOp::MetricDatapoints, scope)?;
        Ok(self
            .data
            .lock()
            .metrics
            .iter()
            .find(|s| {
                s.namespace == query.namespace
                    && s.metric_name == query.metric_name
                    && s.resource_id == query.resource_id
            })
            .map(|s| s.datapoints.clone())
            .unwrap_or_default())
    }

    async fn stop_instance(&self, scope: &Scope, instance_id: &str) -> CloudResult<StopResult> {
        self.enter(FixtureOp::StopInstance, scope)?;
        let mut data = self.data.lock();
        let instance = data
            .inventories
            .get_mut(&scope.region)
            .and_then(|inv| inv.instances.iter_mut().find(|i| i.instance_id == instance_id))
            .ok_or_else(|| CloudError::NotFound(format!("instance {instance_id}")))?;

        let previous_state = instance.state;
        if matches!(previous_state, Ec2State::Running | Ec2State::Pending) {
            instance.state = Ec2State::Stopping;
        }
        Ok(StopResult {
            instance_id: instance_id.to_string(),
            previous_state,
            current_state: instance.state,
        })
    }

    async fn cost_and_usage(&self, scope: &Scope, period: DateRange) -> CloudResult<CostPeriod> {
        self.enter(FixtureOp::CostAndUsage, scope)?;
        Ok(self
            .data
            .lock()
            .costs
            .get(&period.start)
            .cloned()
            .unwrap_or_default())
    }

    async fn cost_forecast(&self, scope: &Scope, _period: DateRange) -> CloudResult<f64> {
        self.enter(FixtureOp::CostForecast, scope)?;
        self.data
            .lock()
            .forecast
            .ok_or_else(|| CloudError::Upstream("insufficient data for a forecast".to_string()))
    }
}
